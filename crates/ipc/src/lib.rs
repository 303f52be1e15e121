//! # ipc
//!
//! Typed parcels, remote object references, and the stub/proxy plumbing that
//! the ability runtime's interfaces are built on.
//!
//! ## Philosophy
//!
//! - **Manual marshalling**: arguments are written and read in a fixed order,
//!   one typed item at a time. There is no schema and no reflection.
//! - **Identity over address**: remote objects are compared by `ObjectId`.
//! - **Transport agnostic**: a `LocalObject` delivers in-process, a `Peer`
//!   delivers over any byte `Transport`. Callers only see `RemoteObject`.

pub mod channel;
pub mod error;
pub mod frame;
pub mod object;
pub mod parcel;
pub mod peer;
pub mod status;
pub mod stub;
pub mod transport;


pub use error::Error;
pub use error::Result;
pub use object::DeathRecipient;
pub use object::LocalObject;
pub use object::MessageOption;
pub use object::ObjectId;
pub use object::RemoteObject;
pub use object::same_object;
pub use parcel::ObjectRef;
pub use parcel::Parcel;
pub use parcel::Parcelable;
pub use peer::Peer;
pub use stub::DispatchTable;
pub use stub::RemoteStub;
