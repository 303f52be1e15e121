//! # Wire Frames
//!
//! The envelope a `Peer` puts around each request and reply when parcels
//! cross a byte transport. Frames are themselves encoded as parcels.
//!
//! - `Call  := u32 kind, u64 seq, u32 code, u32 flags, bytes payload`
//! - `Reply := u32 kind, u64 seq, i32 status, bytes payload`

use crate::Error;
use crate::Result;
use crate::parcel::Parcel;

const KIND_CALL: u32 = 1;
const KIND_REPLY: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Call { seq: u64, code: u32, flags: u32, payload: Vec<u8> },
    Reply { seq: u64, status: i32, payload: Vec<u8> },
}

impl Frame {
    pub fn seq(&self) -> u64 {
        match self {
            Frame::Call { seq, .. } | Frame::Reply { seq, .. } => *seq,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut parcel = Parcel::new();
        match self {
            Frame::Call { seq, code, flags, payload } => {
                parcel.write_u32(KIND_CALL)?;
                parcel.write_u64(*seq)?;
                parcel.write_u32(*code)?;
                parcel.write_u32(*flags)?;
                parcel.write_bytes(payload)?;
            }
            Frame::Reply { seq, status, payload } => {
                parcel.write_u32(KIND_REPLY)?;
                parcel.write_u64(*seq)?;
                parcel.write_i32(*status)?;
                parcel.write_bytes(payload)?;
            }
        }
        let (bytes, _) = parcel.into_parts();
        Ok(bytes)
    }

    pub fn decode(bytes: Vec<u8>) -> Result<Frame> {
        let mut parcel = Parcel::from_bytes(bytes);
        let frame = match parcel.read_u32()? {
            KIND_CALL => Frame::Call {
                seq: parcel.read_u64()?,
                code: parcel.read_u32()?,
                flags: parcel.read_u32()?,
                payload: parcel.read_bytes()?,
            },
            KIND_REPLY => Frame::Reply {
                seq: parcel.read_u64()?,
                status: parcel.read_i32()?,
                payload: parcel.read_bytes()?,
            },
            other => {
                return Err(Error::ProtocolViolation(format!("unknown frame kind {}", other)));
            }
        };
        if parcel.remaining() != 0 {
            return Err(Error::ProtocolViolation("trailing bytes after frame".into()));
        }
        Ok(frame)
    }
}
