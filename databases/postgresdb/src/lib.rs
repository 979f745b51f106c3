//! Postgres persistence for sensor readings.

pub mod client;
pub mod store;

pub use client::PostgresClient;
pub use store::{SensorStore, StoreError};
