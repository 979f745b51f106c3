//! Queue-draining dispatcher: decodes envelopes, routes by device type,
//! and persists readings into per-device tables.

pub mod config;
pub mod dispatch;
pub mod router;

pub use config::DispatcherConfig;
pub use dispatch::{prepare, DispatchError, Dispatcher, Routed};
pub use router::{Destination, StoreRouter};
