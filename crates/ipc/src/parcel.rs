//! # Parcel
//!
//! An ordered, typed byte stream plus an out-of-band table of remote objects.
//! Every cross-process call marshals its arguments into a parcel in a fixed
//! order and the receiving side reads them back in exactly the same order.
//!
//! ## Format
//!
//! - **Scalars**: `[Tag: 1b][Data: N]`
//! - **Blobs**: `[Tag: 1b][Len: 4b][Data: Len]` (strings, bytes, interface tokens)
//! - **Records**: `[Tag: 1b][Len: 4b][Body: Len]` (one nested parcelable)
//! - **Objects**: `[Tag: 1b][Index: 4b]` into the object table
//! - **Null**: `[Tag: 1b]` (absent parcelable or object)
//!
//! All integers are Little-Endian.
//!
//! ## Invariants
//!
//! - Reads consume items strictly in write order; a tag mismatch is an error,
//!   never a silent reinterpretation.
//! - A record read never runs past its declared body. Unread trailing bytes of
//!   a record are skipped, so newer writers can append fields.
//! - A null marker is never turned into a default value: `read_parcelable`
//!   and `read_remote_object` fail with `Error::NullObject`.

use std::sync::Arc;

use crate::object::RemoteObject;

/// Upper bound on the data section of a single parcel.
pub const MAX_PARCEL_SIZE: usize = 1 << 20;

/// Shared handle to a remote (or local) object carried by a parcel.
pub type ObjectRef = Arc<dyn RemoteObject>;

/// Parcel encoding and decoding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Writing would grow the parcel past `MAX_PARCEL_SIZE`.
    BufferFull,
    /// The next item does not carry the expected tag.
    TagMismatch { expected: Tag, found: u8 },
    /// Byte does not correspond to a valid `Tag`.
    InvalidTag(u8),
    /// String data is not valid UTF-8.
    InvalidUtf8,
    /// Buffer exhausted while reading.
    UnexpectedEnd,
    /// Blob or record length exceeds `u32::MAX`.
    BlobTooLarge(usize),
    /// A required object or parcelable was written as null.
    NullObject,
    /// Object index does not refer to an entry in the object table.
    ObjectOutOfRange(u32),
    /// A collection count was negative.
    NegativeCount(i32),
    /// A decoded value is out of range for its type.
    InvalidValue(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::BufferFull => write!(f, "parcel capacity of {} bytes exceeded", MAX_PARCEL_SIZE),
            Error::TagMismatch { expected, found } => {
                write!(f, "expected {:?}, found tag byte {:#04x}", expected, found)
            }
            Error::InvalidTag(b) => write!(f, "invalid tag byte: {:#04x}", b),
            Error::InvalidUtf8 => write!(f, "string data is not valid UTF-8"),
            Error::UnexpectedEnd => write!(f, "unexpected end of parcel"),
            Error::BlobTooLarge(len) => write!(f, "blob of {} bytes is too large", len),
            Error::NullObject => write!(f, "required value was null"),
            Error::ObjectOutOfRange(idx) => write!(f, "object index {} out of range", idx),
            Error::NegativeCount(n) => write!(f, "negative collection count {}", n),
            Error::InvalidValue(msg) => write!(f, "invalid value: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Identifies the type of the next encoded item.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    BoolTrue = 0x01,
    BoolFalse = 0x02,
    U32 = 0x05,
    U64 = 0x06,
    I32 = 0x09,
    I64 = 0x0A,
    Null = 0x0F,
    String = 0x10,
    Bytes = 0x11,
    Token = 0x12,
    Object = 0x13,
    Record = 0x30,
}

impl Tag {
    /// Returns the Tag for a given byte, or `None` if invalid.
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Tag::BoolTrue),
            0x02 => Some(Tag::BoolFalse),
            0x05 => Some(Tag::U32),
            0x06 => Some(Tag::U64),
            0x09 => Some(Tag::I32),
            0x0A => Some(Tag::I64),
            0x0F => Some(Tag::Null),
            0x10 => Some(Tag::String),
            0x11 => Some(Tag::Bytes),
            0x12 => Some(Tag::Token),
            0x13 => Some(Tag::Object),
            0x30 => Some(Tag::Record),
            _ => None,
        }
    }
}

/// A value that knows how to write itself into a parcel and read itself back.
///
/// `unmarshal` must read exactly the items `marshal` wrote, in the same order.
pub trait Parcelable: Sized {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()>;
    fn unmarshal(parcel: &mut Parcel) -> Result<Self>;
}

/// An ordered, typed byte stream with a read cursor and an object table.
#[derive(Default)]
pub struct Parcel {
    buf: Vec<u8>,
    pos: usize,
    /// End of the readable region while inside a record.
    limit: Option<usize>,
    objects: Vec<ObjectRef>,
}

impl std::fmt::Debug for Parcel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parcel")
            .field("len", &self.buf.len())
            .field("pos", &self.pos)
            .field("objects", &self.objects.len())
            .finish()
    }
}

impl Parcel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps raw bytes received from a byte transport. The object table is empty.
    pub fn from_bytes(buf: Vec<u8>) -> Self {
        Self { buf, ..Self::default() }
    }

    pub fn from_parts(buf: Vec<u8>, objects: Vec<ObjectRef>) -> Self {
        Self { buf, pos: 0, limit: None, objects }
    }

    pub fn into_parts(self) -> (Vec<u8>, Vec<ObjectRef>) {
        (self.buf, self.objects)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes left between the read cursor and the end of the readable region.
    pub fn remaining(&self) -> usize {
        self.read_end().saturating_sub(self.pos)
    }

    /// Moves the read cursor back to the first item.
    pub fn rewind(&mut self) {
        self.pos = 0;
        self.limit = None;
    }

    pub fn objects(&self) -> &[ObjectRef] {
        &self.objects
    }

    pub fn has_objects(&self) -> bool {
        !self.objects.is_empty()
    }

    // ------------------------------------------------------------------
    //  Writing
    // ------------------------------------------------------------------

    fn reserve(&self, additional: usize) -> Result<()> {
        if self.buf.len().saturating_add(additional) > MAX_PARCEL_SIZE {
            return Err(Error::BufferFull);
        }
        Ok(())
    }

    fn put(&mut self, tag: Tag, body: &[u8]) -> Result<()> {
        self.reserve(1 + body.len())?;
        self.buf.push(tag as u8);
        self.buf.extend_from_slice(body);
        Ok(())
    }

    fn put_blob(&mut self, tag: Tag, data: &[u8]) -> Result<()> {
        let len = u32::try_from(data.len()).map_err(|_| Error::BlobTooLarge(data.len()))?;
        self.reserve(5 + data.len())?;
        self.buf.push(tag as u8);
        self.buf.extend_from_slice(&len.to_le_bytes());
        self.buf.extend_from_slice(data);
        Ok(())
    }

    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.put(if v { Tag::BoolTrue } else { Tag::BoolFalse }, &[])
    }

    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        self.put(Tag::I32, &v.to_le_bytes())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.put(Tag::U32, &v.to_le_bytes())
    }

    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        self.put(Tag::I64, &v.to_le_bytes())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        self.put(Tag::U64, &v.to_le_bytes())
    }

    pub fn write_string(&mut self, v: &str) -> Result<()> {
        self.put_blob(Tag::String, v.as_bytes())
    }

    pub fn write_bytes(&mut self, v: &[u8]) -> Result<()> {
        self.put_blob(Tag::Bytes, v)
    }

    /// Writes the interface descriptor every request must start with.
    pub fn write_interface_token(&mut self, descriptor: &str) -> Result<()> {
        self.put_blob(Tag::Token, descriptor.as_bytes())
    }

    pub fn write_null(&mut self) -> Result<()> {
        self.put(Tag::Null, &[])
    }

    /// Appends the object to the object table and writes its index.
    pub fn write_remote_object(&mut self, object: &ObjectRef) -> Result<()> {
        let index = u32::try_from(self.objects.len()).map_err(|_| Error::BufferFull)?;
        self.put(Tag::Object, &index.to_le_bytes())?;
        self.objects.push(object.clone());
        Ok(())
    }

    pub fn write_optional_remote_object(&mut self, object: Option<&ObjectRef>) -> Result<()> {
        match object {
            Some(object) => self.write_remote_object(object),
            None => self.write_null(),
        }
    }

    /// Writes `value` as a length-prefixed record. The length is back-patched
    /// once the body is complete.
    pub fn write_parcelable<T: Parcelable>(&mut self, value: &T) -> Result<()> {
        self.reserve(5)?;
        self.buf.push(Tag::Record as u8);
        let len_pos = self.buf.len();
        self.buf.extend_from_slice(&[0, 0, 0, 0]);

        value.marshal(self)?;

        let body_len = self.buf.len() - len_pos - 4;
        let len = u32::try_from(body_len).map_err(|_| Error::BlobTooLarge(body_len))?;
        self.buf[len_pos..len_pos + 4].copy_from_slice(&len.to_le_bytes());
        Ok(())
    }

    pub fn write_optional_parcelable<T: Parcelable>(&mut self, value: Option<&T>) -> Result<()> {
        match value {
            Some(value) => self.write_parcelable(value),
            None => self.write_null(),
        }
    }

    fn write_count(&mut self, len: usize) -> Result<()> {
        let count = i32::try_from(len).map_err(|_| Error::BlobTooLarge(len))?;
        self.write_i32(count)
    }

    /// Writes an `i32` count followed by each element as a record.
    pub fn write_parcelable_vec<T: Parcelable>(&mut self, values: &[T]) -> Result<()> {
        self.write_count(values.len())?;
        for value in values {
            self.write_parcelable(value)?;
        }
        Ok(())
    }

    pub fn write_string_vec(&mut self, values: &[String]) -> Result<()> {
        self.write_count(values.len())?;
        for value in values {
            self.write_string(value)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    //  Reading
    // ------------------------------------------------------------------

    fn read_end(&self) -> usize {
        self.limit.unwrap_or(self.buf.len())
    }

    /// Peeks the next Tag without advancing.
    pub fn peek_tag(&self) -> Result<Tag> {
        if self.pos >= self.read_end() {
            return Err(Error::UnexpectedEnd);
        }
        let b = self.buf[self.pos];
        Tag::from_u8(b).ok_or(Error::InvalidTag(b))
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let end = self.pos.checked_add(n).ok_or(Error::UnexpectedEnd)?;
        if end > self.read_end() {
            return Err(Error::UnexpectedEnd);
        }
        let start = self.pos;
        self.pos = end;
        Ok(&self.buf[start..end])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn expect_tag(&mut self, expected: Tag) -> Result<()> {
        let tag = self.peek_tag()?;
        if tag != expected {
            return Err(Error::TagMismatch { expected, found: tag as u8 });
        }
        self.pos += 1;
        Ok(())
    }

    fn take_len(&mut self) -> Result<usize> {
        Ok(u32::from_le_bytes(self.take_array()?) as usize)
    }

    fn take_blob(&mut self, tag: Tag) -> Result<Vec<u8>> {
        self.expect_tag(tag)?;
        let len = self.take_len()?;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.peek_tag()? {
            Tag::BoolTrue => {
                self.pos += 1;
                Ok(true)
            }
            Tag::BoolFalse => {
                self.pos += 1;
                Ok(false)
            }
            other => Err(Error::TagMismatch { expected: Tag::BoolTrue, found: other as u8 }),
        }
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.expect_tag(Tag::I32)?;
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.expect_tag(Tag::U32)?;
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.expect_tag(Tag::I64)?;
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.expect_tag(Tag::U64)?;
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.take_blob(Tag::String)?;
        String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        self.take_blob(Tag::Bytes)
    }

    pub fn read_interface_token(&mut self) -> Result<String> {
        let bytes = self.take_blob(Tag::Token)?;
        String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }

    /// Consumes a null marker if one is next. Returns whether it did.
    fn take_null(&mut self) -> Result<bool> {
        if self.peek_tag()? == Tag::Null {
            self.pos += 1;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn read_remote_object(&mut self) -> Result<ObjectRef> {
        self.read_optional_remote_object()?.ok_or(Error::NullObject)
    }

    pub fn read_optional_remote_object(&mut self) -> Result<Option<ObjectRef>> {
        if self.take_null()? {
            return Ok(None);
        }
        self.expect_tag(Tag::Object)?;
        let index = u32::from_le_bytes(self.take_array()?);
        let object = self
            .objects
            .get(index as usize)
            .cloned()
            .ok_or(Error::ObjectOutOfRange(index))?;
        Ok(Some(object))
    }

    /// Reads a required record. A null marker fails with `Error::NullObject`.
    pub fn read_parcelable<T: Parcelable>(&mut self) -> Result<T> {
        self.read_optional_parcelable()?.ok_or(Error::NullObject)
    }

    pub fn read_optional_parcelable<T: Parcelable>(&mut self) -> Result<Option<T>> {
        if self.take_null()? {
            return Ok(None);
        }
        self.expect_tag(Tag::Record)?;
        let len = self.take_len()?;
        let end = self.pos.checked_add(len).ok_or(Error::UnexpectedEnd)?;
        if end > self.read_end() {
            return Err(Error::UnexpectedEnd);
        }

        let outer = self.limit.replace(end);
        let value = T::unmarshal(self);
        self.limit = outer;

        let value = value?;
        self.pos = end;
        Ok(Some(value))
    }

    fn read_count(&mut self) -> Result<usize> {
        let count = self.read_i32()?;
        usize::try_from(count).map_err(|_| Error::NegativeCount(count))
    }

    pub fn read_parcelable_vec<T: Parcelable>(&mut self) -> Result<Vec<T>> {
        let count = self.read_count()?;
        let mut out = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            out.push(self.read_parcelable()?);
        }
        Ok(out)
    }

    pub fn read_string_vec(&mut self) -> Result<Vec<String>> {
        let count = self.read_count()?;
        let mut out = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            out.push(self.read_string()?);
        }
        Ok(out)
    }

    /// Skips the next item, including any nested record body.
    pub fn skip(&mut self) -> Result<()> {
        let tag = self.peek_tag()?;
        self.pos += 1;
        match tag {
            Tag::BoolTrue | Tag::BoolFalse | Tag::Null => {}
            Tag::U32 | Tag::I32 | Tag::Object => {
                self.take(4)?;
            }
            Tag::U64 | Tag::I64 => {
                self.take(8)?;
            }
            Tag::String | Tag::Bytes | Tag::Token | Tag::Record => {
                let len = self.take_len()?;
                self.take(len)?;
            }
        }
        Ok(())
    }
}
