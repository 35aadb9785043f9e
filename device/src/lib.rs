//! # Fleet Gateway Device
//!
//! Bookkeeping for the device connections a gateway holds open: who is
//! connected, how many connections the gateway will admit, and who gets told
//! when connections come and go.
//!
//! ## Key Features
//!
//! - **Sharded Registry**: live devices indexed by logical [`Id`], spread over
//!   independently locked shards; several connections may share one `Id`
//! - **Admission Control**: a closeable semaphore bounds connected devices and
//!   rejects pending connects on shutdown
//! - **Lifecycle Events**: borrowed [`Event`] records dispatched synchronously
//!   to every registered listener
//! - **Per-Device Statistics**: atomic traffic and duplication counters
//!
//! ## Usage
//!
//! ```rust,ignore
//! use device::{Id, Listeners, Manager, ManagerConfig};
//!
//! device::logging::init_logging_from_env()?;
//!
//! let listeners = Listeners::new()
//!     .with(|event| tracing::info!("{} {}", event.event_type(), event.device()));
//! let manager = Manager::new(ManagerConfig::default(), listeners)?;
//!
//! let (device, outbound) = manager.connect(Id::parse("serial:ABC123")?).await?;
//! device.send(bytes::Bytes::from_static(b"hello"))?;
//!
//! manager.shutdown();
//! ```
//!
//! Logging is configured from `GATEWAY_LOG_MODE` (`silent`, `development`,
//! `debug` or `json`) and `GATEWAY_LOG_LEVEL`, falling back to `RUST_LOG`.
//!
//! The transport owns sockets and framing. It drives the manager from its
//! accept and hang-up paths and drains each device's outbound queue.

pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod id;
pub mod logging;
pub mod manager;
pub mod registry;

pub use config::ManagerConfig;
pub use device::{Device, Key, Statistics, StatisticsSnapshot};
pub use error::{DeviceError, IdError, ManagerError, RegistryError, Result};
pub use event::{
    Event, EventType, Listener, Listeners, Message, Routable, INVALID_EVENT_STRING,
};
pub use id::Id;
pub use manager::Manager;
pub use registry::Registry;

// Re-export the admission primitives
pub use semaphore::{Closeable, Context, ContextError, SemaphoreError};

/// Common imports for code driving the manager
pub mod prelude {
    pub use crate::{
        Device, Event, EventType, Id, Listeners, Manager, ManagerConfig, ManagerError, Routable,
    };
}
