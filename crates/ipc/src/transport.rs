//! # Transport Abstraction
//!
//! A minimal, async interface for moving bytes between processes.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The transport knows nothing about frames, parcels, or
//!   interface codes. It moves opaque buffers.
//! - **Full Duplex**: Either side may send at any time. Request/reply
//!   correlation is built on top of this by `Peer`.

use std::fmt;

/// Errors that occur at the transport layer.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// The remote peer rejected the payload size.
    PayloadTooLarge,
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "connection lost: {}", msg),
            Self::PayloadTooLarge => write!(f, "payload too large for transport"),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

pub type Result<T> = std::result::Result<T, TransportError>;

/// A bidirectional byte pipe.
///
/// This trait is object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one message.
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Receives the next message, or `None` once the stream is closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;

    /// Closes the sending half. The other end's `recv()` then yields `None`.
    async fn close(&self) {}
}
