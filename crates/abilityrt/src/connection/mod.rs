//! Service connections: the callback interface the service talks back on,
//! the service-side record of each binding, the client-side registry, and
//! connection observers.

pub mod callback;
pub mod observer;
pub mod record;
pub mod registry;

pub use callback::AbilityConnection;
pub use callback::AbilityConnectionProxy;
pub use callback::AbilityConnectionStub;
pub use observer::ConnectionObserver;
pub use observer::ConnectionObserverStub;
pub use observer::ObserverController;
pub use record::ConnectionKind;
pub use record::ConnectionRecord;
pub use registry::ConnectionKey;
pub use registry::ConnectionRegistry;
pub use registry::ServiceConnection;
