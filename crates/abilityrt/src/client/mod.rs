//! The application side: the lifecycle an ability implements, the thread
//! that drives it, and the context it reaches the manager through.

pub mod context;
pub mod lifecycle;
pub mod thread;

pub use context::AbilityContext;
pub use context::ClientConnection;
pub use lifecycle::AbilityLifecycle;
pub use thread::AbilityThread;
