//! # abilityrt
//!
//! The core of an ability runtime: the manager that starts application
//! components ("abilities"), binds clients to them, drives them through their
//! lifecycle, and tears them down, all across process boundaries.
//!
//! ## Architecture
//!
//! - **Manager surface**: `AbilityManager` is one async trait. The service
//!   implements it in-process; `AbilityManagerProxy` implements it over any
//!   remote object; `AbilityManagerStub` serves it from a dispatch table.
//! - **Records**: `AbilityRecord` is the authoritative state of one running
//!   ability. `ConnectionRecord` is one client bound to it.
//! - **Callbacks**: the scheduler, connection, and observer interfaces carry
//!   the manager's requests back out, always fire-and-forget.
//! - **Client**: `AbilityThread` and `AbilityContext` are what an application
//!   process runs.
//!
//! ## Concurrency
//!
//! Outbound calls are posted to a `TaskHandler` and run in submission order.
//! Locks guard state only and are never held across an outbound call.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod info;
pub mod manager;
pub mod monitor;
pub mod record;
pub mod scheduler;
pub mod service;
pub mod state;
pub mod task;
pub mod token;
pub mod want;

#[cfg(test)]
mod tests;

pub use config::RuntimeConfig;
pub use error::Error;
pub use error::Result;
pub use manager::AbilityManager;
pub use manager::AbilityManagerProxy;
pub use manager::AbilityManagerStub;
pub use monitor::AbilityMonitor;
pub use monitor::MonitorRegistry;
pub use record::AbilityRecord;
pub use service::AbilityManagerService;
pub use service::ServiceContext;
pub use state::AbilityState;
pub use state::ConnectionState;
pub use task::TaskHandler;
pub use want::ElementName;
pub use want::Want;
