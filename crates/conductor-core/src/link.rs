//! Opaque transport seam to the remote-variable layer.
//!
//! The pipeline is agnostic to how device channels are reached: remote
//! channel access, a local gateway, or the in-process simulation used by
//! tests. Any transport satisfying [`DeviceLink`] is valid. Transport
//! failures surface as [`crate::error::CommandError::Link`] and are
//! absorbed by tasks as per-device failures.

use crate::error::CmdResult;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// One device's remote-variable connection.
///
/// # Contract
/// - `wait_connected` blocks at most `timeout` and reports reachability;
///   it never errors
/// - `put` is fire-and-forget: it returns once the write is dispatched,
///   not once the device confirms it
/// - `get` of a field the device does not expose yields `Value::Null`
///
/// # Thread Safety
/// - All methods take `&self`; implementations use interior mutability
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Wait up to `timeout` for the underlying channels to connect.
    async fn wait_connected(&self, timeout: Duration) -> bool;

    /// Write one named field.
    async fn put(&self, field: &str, value: Value) -> CmdResult<()>;

    /// Read one named field.
    async fn get(&self, field: &str) -> CmdResult<Value>;
}

/// Source of [`DeviceLink`]s, keyed by channel name.
///
/// Implemented by the (excluded) device-access layer and by the simulated
/// transport. Providers hand out shared links: repeated calls with the
/// same name return handles onto the same underlying connection.
pub trait LinkProvider: Send + Sync {
    fn link(&self, name: &str) -> Arc<dyn DeviceLink>;
}
