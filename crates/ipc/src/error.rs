//! # Error Definitions
//!
//! Failures of the request path itself, as opposed to domain errors that a
//! handler reports inside its reply.

use crate::parcel;
use crate::status;
use crate::transport::TransportError;

#[derive(Debug, Clone)]
pub enum Error {
    /// Marshalling or unmarshalling failed.
    Parcel(parcel::Error),
    /// The byte transport failed.
    Transport(TransportError),
    /// The receiving stub returned a non-zero status.
    Status(i32),
    /// The target object (or its process) is gone.
    DeadObject,
    /// No reply arrived within the request timeout.
    Timeout,
    /// The reply channel was dropped before a reply arrived.
    ChannelClosed,
    /// A frame did not have the expected structure.
    ProtocolViolation(String),
    /// Parcels carrying remote objects cannot cross a byte transport.
    ObjectNotTransferable,
}

impl Error {
    /// The status code a proxy reports for this failure.
    pub fn status_code(&self) -> i32 {
        match self {
            Error::Status(code) => *code,
            Error::Parcel(_) | Error::ProtocolViolation(_) => status::ERR_INVALID_DATA,
            Error::Transport(_) | Error::DeadObject | Error::ChannelClosed => status::ERR_DEAD_OBJECT,
            Error::Timeout => status::ERR_TIMED_OUT,
            Error::ObjectNotTransferable => status::ERR_INVALID_OPERATION,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Parcel(e) => write!(f, "parcel error: {}", e),
            Error::Transport(e) => write!(f, "transport error: {}", e),
            Error::Status(code) => write!(f, "remote returned status {}", code),
            Error::DeadObject => write!(f, "remote object is dead"),
            Error::Timeout => write!(f, "request timed out"),
            Error::ChannelClosed => write!(f, "reply channel closed"),
            Error::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
            Error::ObjectNotTransferable => write!(f, "remote objects cannot cross a byte transport"),
        }
    }
}

impl std::error::Error for Error {}

impl From<parcel::Error> for Error {
    fn from(e: parcel::Error) -> Self {
        Self::Parcel(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
