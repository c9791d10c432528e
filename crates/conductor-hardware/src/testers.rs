//! Concrete testers, one per device kind.
//!
//! Each tester wraps one device's [`DeviceLink`] and dispatches named
//! operations onto its fields. Set operations are fire-and-forget writes;
//! check operations read a field back and compare. Numeric comparisons
//! use an absolute tolerance so analog readbacks confirm.
//!
//! Operation vocabulary:
//!
//! | Kind          | Set ops                          | Check ops                              |
//! |---------------|----------------------------------|----------------------------------------|
//! | power supply  | `pwrstate`, `opmode`, `current`, `reset` | `pwrstate`, `opmode`, `current`, `interlock` |
//! | DC-link       | `pwrstate`, `voltage`, `reset`   | `pwrstate`, `voltage`, `interlock`     |
//! | pulsed magnet | `pulse`, `voltage`, `reset`      | `pulse`, `voltage`, `interlock`        |
//!
//! `reset` is set-only (clears latched interlocks); `interlock` is
//! check-only (clear when the counter reads zero). In test mode, numeric
//! setpoints are replaced by the kind's reduced test value.

use async_trait::async_trait;
use conductor_core::{
    CmdResult, CommandError, DeviceId, DeviceKind, DeviceLink, DeviceTester, OpParams, TriggerId,
    TriggerTester,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Absolute tolerance for numeric readback comparisons
const NUMERIC_TOLERANCE: f64 = 1e-6;

/// Reduced current setpoint driven by power supplies in test mode (A)
const TEST_CURRENT: f64 = 0.1;

/// Reduced voltage setpoint driven by DC-links and pulsed magnets in test mode (V)
const TEST_VOLTAGE: f64 = 1.0;

// =============================================================================
// Shared helpers
// =============================================================================

/// Compare a readback against a target, tolerating numeric jitter.
fn values_match(read: &Value, want: &Value) -> bool {
    match (read.as_f64(), want.as_f64()) {
        (Some(a), Some(b)) => (a - b).abs() <= NUMERIC_TOLERANCE,
        _ => read == want,
    }
}

/// The caller-supplied target value; structural error when absent.
fn required_value(op: &str, params: &OpParams) -> CmdResult<Value> {
    params
        .value
        .clone()
        .ok_or_else(|| CommandError::InvalidParams {
            op: op.to_string(),
            message: "missing target value".to_string(),
        })
}

/// Target of a numeric setpoint op: the test setpoint in test mode,
/// the caller value otherwise.
fn setpoint_value(op: &str, params: &OpParams, test_value: f64) -> CmdResult<Value> {
    if params.test_mode {
        Ok(json!(test_value))
    } else {
        required_value(op, params)
    }
}

/// An interlock counter is clear when absent or zero.
fn interlock_clear(read: &Value) -> bool {
    read.is_null() || values_match(read, &json!(0))
}

fn unsupported(device: &DeviceId, kind: DeviceKind, op: &str) -> CommandError {
    CommandError::UnsupportedOperation {
        device: device.clone(),
        kind,
        op: op.to_string(),
    }
}

// =============================================================================
// Power Supply
// =============================================================================

/// Tester for magnet power supplies.
pub struct PowerSupplyTester {
    device: DeviceId,
    link: Arc<dyn DeviceLink>,
}

impl PowerSupplyTester {
    pub fn new(device: DeviceId, link: Arc<dyn DeviceLink>) -> Self {
        Self { device, link }
    }
}

#[async_trait]
impl DeviceTester for PowerSupplyTester {
    fn device(&self) -> &DeviceId {
        &self.device
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::PowerSupply
    }

    async fn wait_connected(&self, timeout: Duration) -> bool {
        self.link.wait_connected(timeout).await
    }

    async fn apply(&self, op: &str, params: &OpParams) -> CmdResult<()> {
        match op {
            "pwrstate" | "opmode" => self.link.put(op, required_value(op, params)?).await,
            "current" => {
                self.link
                    .put(op, setpoint_value(op, params, TEST_CURRENT)?)
                    .await
            }
            "reset" => self.link.put("reset", json!(1)).await,
            _ => Err(unsupported(&self.device, self.kind(), op)),
        }
    }

    async fn check(&self, op: &str, params: &OpParams) -> CmdResult<bool> {
        match op {
            "pwrstate" | "opmode" => {
                let want = required_value(op, params)?;
                Ok(values_match(&self.link.get(op).await?, &want))
            }
            "current" => {
                let want = setpoint_value(op, params, TEST_CURRENT)?;
                Ok(values_match(&self.link.get(op).await?, &want))
            }
            "interlock" => Ok(interlock_clear(&self.link.get("interlock").await?)),
            _ => Err(unsupported(&self.device, self.kind(), op)),
        }
    }
}

// =============================================================================
// DC-Link
// =============================================================================

/// Tester for DC-link supplies feeding downstream power supplies.
pub struct DcLinkTester {
    device: DeviceId,
    link: Arc<dyn DeviceLink>,
}

impl DcLinkTester {
    pub fn new(device: DeviceId, link: Arc<dyn DeviceLink>) -> Self {
        Self { device, link }
    }
}

#[async_trait]
impl DeviceTester for DcLinkTester {
    fn device(&self) -> &DeviceId {
        &self.device
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::DcLink
    }

    async fn wait_connected(&self, timeout: Duration) -> bool {
        self.link.wait_connected(timeout).await
    }

    async fn apply(&self, op: &str, params: &OpParams) -> CmdResult<()> {
        match op {
            "pwrstate" => self.link.put(op, required_value(op, params)?).await,
            "voltage" => {
                self.link
                    .put(op, setpoint_value(op, params, TEST_VOLTAGE)?)
                    .await
            }
            "reset" => self.link.put("reset", json!(1)).await,
            _ => Err(unsupported(&self.device, self.kind(), op)),
        }
    }

    async fn check(&self, op: &str, params: &OpParams) -> CmdResult<bool> {
        match op {
            "pwrstate" => {
                let want = required_value(op, params)?;
                Ok(values_match(&self.link.get(op).await?, &want))
            }
            "voltage" => {
                let want = setpoint_value(op, params, TEST_VOLTAGE)?;
                Ok(values_match(&self.link.get(op).await?, &want))
            }
            "interlock" => Ok(interlock_clear(&self.link.get("interlock").await?)),
            _ => Err(unsupported(&self.device, self.kind(), op)),
        }
    }
}

// =============================================================================
// Pulsed Magnet
// =============================================================================

/// Tester for pulsed magnets (kickers, septa).
pub struct PulsedMagnetTester {
    device: DeviceId,
    link: Arc<dyn DeviceLink>,
}

impl PulsedMagnetTester {
    pub fn new(device: DeviceId, link: Arc<dyn DeviceLink>) -> Self {
        Self { device, link }
    }
}

#[async_trait]
impl DeviceTester for PulsedMagnetTester {
    fn device(&self) -> &DeviceId {
        &self.device
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::PulsedMagnet
    }

    async fn wait_connected(&self, timeout: Duration) -> bool {
        self.link.wait_connected(timeout).await
    }

    async fn apply(&self, op: &str, params: &OpParams) -> CmdResult<()> {
        match op {
            "pulse" => self.link.put(op, required_value(op, params)?).await,
            "voltage" => {
                self.link
                    .put(op, setpoint_value(op, params, TEST_VOLTAGE)?)
                    .await
            }
            "reset" => self.link.put("reset", json!(1)).await,
            _ => Err(unsupported(&self.device, self.kind(), op)),
        }
    }

    async fn check(&self, op: &str, params: &OpParams) -> CmdResult<bool> {
        match op {
            "pulse" => {
                let want = required_value(op, params)?;
                Ok(values_match(&self.link.get(op).await?, &want))
            }
            "voltage" => {
                let want = setpoint_value(op, params, TEST_VOLTAGE)?;
                Ok(values_match(&self.link.get(op).await?, &want))
            }
            "interlock" => Ok(interlock_clear(&self.link.get("interlock").await?)),
            _ => Err(unsupported(&self.device, self.kind(), op)),
        }
    }
}

// =============================================================================
// Timing Trigger
// =============================================================================

/// Tester for one shared timing trigger channel.
pub struct TimingTriggerTester {
    trigger: TriggerId,
    link: Arc<dyn DeviceLink>,
}

impl TimingTriggerTester {
    pub fn new(trigger: TriggerId, link: Arc<dyn DeviceLink>) -> Self {
        Self { trigger, link }
    }
}

#[async_trait]
impl TriggerTester for TimingTriggerTester {
    fn trigger(&self) -> &TriggerId {
        &self.trigger
    }

    async fn wait_connected(&self, timeout: Duration) -> bool {
        self.link.wait_connected(timeout).await
    }

    async fn state(&self) -> CmdResult<Value> {
        self.link.get("state").await
    }

    async fn apply_state(&self, value: &Value) -> CmdResult<()> {
        self.link.put("state", value.clone()).await
    }

    async fn check_state(&self, value: &Value) -> CmdResult<bool> {
        Ok(values_match(&self.link.get("state").await?, value))
    }
}
