//! Capability traits for device and trigger testers.
//!
//! A tester is the polymorphic capability object for one device: it
//! exposes the named set/check operations the task engine drives. One
//! tester exists per device for the process lifetime, owned by the
//! registry; callers only borrow `Arc` handles.
//!
//! # Design
//!
//! Each trait:
//! - is async (`#[async_trait]`) and thread-safe (`Send + Sync`)
//! - takes `&self`; implementations use interior mutability
//! - returns `CmdResult` so callers can split transient from fatal errors

use crate::error::CmdResult;
use crate::ids::{DeviceId, DeviceKind, TriggerId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Parameters of one named operation.
///
/// `value` is the optional target (setpoint, state selector); `test_mode`
/// asks the tester to substitute its reduced test setpoint where the
/// operation defines one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpParams {
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub test_mode: bool,
}

impl OpParams {
    /// No target value, no test mode.
    pub fn none() -> Self {
        Self::default()
    }

    /// Target the given value.
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            test_mode: false,
        }
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }
}

/// Capability: named set/check operations for one device.
///
/// # Contract
/// - `apply` dispatches the named operation once and returns without
///   waiting for the device to confirm (verification belongs to `check`)
/// - `check` is a synchronous boolean poll of the named predicate
/// - unknown operation names yield `CommandError::UnsupportedOperation`
#[async_trait]
pub trait DeviceTester: Send + Sync {
    /// The device this tester drives.
    fn device(&self) -> &DeviceId;

    /// The device kind this tester was built for.
    fn kind(&self) -> DeviceKind;

    /// Wait up to `timeout` for the device's channels to connect.
    async fn wait_connected(&self, timeout: Duration) -> bool;

    /// Apply the named operation (`Set<Op>`).
    async fn apply(&self, op: &str, params: &OpParams) -> CmdResult<()>;

    /// Evaluate the named predicate (`Check<Op>`).
    async fn check(&self, op: &str, params: &OpParams) -> CmdResult<bool>;
}

/// Capability: state control for one shared timing trigger.
///
/// Triggers carry a single opaque state value. `state` reads the current
/// value so it can be captured before the first drive and restored later.
#[async_trait]
pub trait TriggerTester: Send + Sync {
    /// The trigger this tester drives.
    fn trigger(&self) -> &TriggerId;

    /// Wait up to `timeout` for the trigger's channels to connect.
    async fn wait_connected(&self, timeout: Duration) -> bool;

    /// Read the trigger's current state.
    async fn state(&self) -> CmdResult<Value>;

    /// Drive the trigger to the given state.
    async fn apply_state(&self, value: &Value) -> CmdResult<()>;

    /// Whether the trigger currently reports the given state.
    async fn check_state(&self, value: &Value) -> CmdResult<bool>;
}
