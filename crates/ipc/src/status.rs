//! Transport-level status codes and reserved transaction codes.
//!
//! A stub returns one of these from `on_remote_request`. Zero means the
//! request was dispatched and the reply parcel holds the documented shape.

pub const ERR_NONE: i32 = 0;
pub const ERR_PERMISSION_DENIED: i32 = 1;
pub const ERR_NAME_NOT_FOUND: i32 = 2;
pub const ERR_UNKNOWN_TRANSACTION: i32 = 16;
pub const ERR_INVALID_STATE: i32 = 19;
pub const ERR_INVALID_VALUE: i32 = 22;
pub const ERR_INVALID_OPERATION: i32 = 38;
pub const ERR_DEAD_OBJECT: i32 = 32;
pub const ERR_INVALID_DATA: i32 = 61;
pub const ERR_TIMED_OUT: i32 = 110;

const fn fourcc(code: [u8; 4]) -> u32 {
    u32::from_be_bytes(code)
}

/// Liveness probe answered by every stub.
pub const PING_TRANSACTION: u32 = fourcc(*b"_PNG");
/// Returns the interface descriptor of the stub.
pub const INTERFACE_TRANSACTION: u32 = fourcc(*b"_NTF");
