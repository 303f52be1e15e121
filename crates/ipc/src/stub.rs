//! # Stubs and Dispatch Tables
//!
//! The receiving side of an interface. A stub checks the interface token,
//! looks the operation code up in a table built once at construction, decodes
//! the arguments into a typed request, and hands it to the implementation.
//!
//! ## Invariants
//!
//! - A table maps each code to exactly one decoder. Registering a code twice
//!   keeps the first entry and reports the clash.
//! - Codes missing from the table go to `default_on_remote_request`, which
//!   answers the reserved transactions and rejects everything else with
//!   `ERR_UNKNOWN_TRANSACTION`.

use std::collections::HashMap;

use tracing::error;
use tracing::warn;

use crate::object::MessageOption;
use crate::parcel;
use crate::parcel::Parcel;
use crate::status;

/// The receiving half of an interface.
#[async_trait::async_trait]
pub trait RemoteStub: Send + Sync + 'static {
    fn descriptor(&self) -> &str;

    /// Handles one request and returns a transport status.
    async fn on_remote_request(
        &self,
        code: u32,
        data: &mut Parcel,
        reply: &mut Parcel,
        option: MessageOption,
    ) -> i32;
}

/// Reads the interface token and compares it with `descriptor`.
pub fn check_interface_token(data: &mut Parcel, descriptor: &str) -> bool {
    match data.read_interface_token() {
        Ok(token) if token == descriptor => true,
        Ok(token) => {
            warn!(expected = descriptor, received = %token, "interface token mismatch");
            false
        }
        Err(e) => {
            warn!(expected = descriptor, error = %e, "missing interface token");
            false
        }
    }
}

/// Fallback for codes an interface does not define.
pub fn default_on_remote_request(descriptor: &str, code: u32, reply: &mut Parcel) -> i32 {
    let written = match code {
        status::PING_TRANSACTION => reply.write_i32(status::ERR_NONE),
        status::INTERFACE_TRANSACTION => reply.write_string(descriptor),
        _ => {
            warn!(descriptor, code, "unknown transaction code");
            return status::ERR_UNKNOWN_TRANSACTION;
        }
    };
    match written {
        Ok(()) => status::ERR_NONE,
        Err(e) => {
            error!(descriptor, code, error = %e, "failed to write default reply");
            status::ERR_INVALID_DATA
        }
    }
}

/// Pure argument decoder for one operation code.
pub type Decode<R> = fn(&mut Parcel) -> parcel::Result<R>;

/// One dispatch table row.
pub struct Entry<R> {
    pub name: &'static str,
    pub decode: Decode<R>,
}

/// Operation code to decoder mapping, built once per stub.
pub struct DispatchTable<R> {
    descriptor: &'static str,
    entries: HashMap<u32, Entry<R>>,
}

impl<R> DispatchTable<R> {
    pub fn new(descriptor: &'static str) -> Self {
        Self { descriptor, entries: HashMap::new() }
    }

    /// Returns `false` and keeps the existing entry if `code` is taken.
    pub fn register(&mut self, code: u32, name: &'static str, decode: Decode<R>) -> bool {
        if let Some(existing) = self.entries.get(&code) {
            error!(
                descriptor = self.descriptor,
                code,
                existing = existing.name,
                rejected = name,
                "operation code registered twice"
            );
            return false;
        }
        self.entries.insert(code, Entry { name, decode });
        true
    }

    pub fn descriptor(&self) -> &'static str {
        self.descriptor
    }

    pub fn get(&self, code: u32) -> Option<&Entry<R>> {
        self.entries.get(&code)
    }

    pub fn contains(&self, code: u32) -> bool {
        self.entries.contains_key(&code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered codes in ascending order.
    pub fn codes(&self) -> Vec<u32> {
        let mut codes: Vec<u32> = self.entries.keys().copied().collect();
        codes.sort_unstable();
        codes
    }
}
