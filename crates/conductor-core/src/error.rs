//! Error taxonomy for command execution.
//!
//! Errors fall into two categories with different propagation rules:
//!
//! 1. **Transient** — `Link`: a device was unreachable or the transport
//!    failed mid-operation. Tasks absorb these into the per-device
//!    Ok/Failed aggregation; they never abort a stage.
//! 2. **Structural** — `UnknownDeviceKind`, `UnsupportedOperation`,
//!    `InvalidParams`, `StateConflict`: a configuration or data defect
//!    that must be fixed at the source. These propagate and halt the
//!    pipeline or workflow.
//!
//! [`CommandError::is_fatal`] encodes the split so task loops do not have
//! to enumerate variants.

use crate::ids::{DeviceId, DeviceKind};
use thiserror::Error;

/// Convenience alias for results using the command error type.
pub type CmdResult<T> = std::result::Result<T, CommandError>;

/// Primary error type for the command/verification pipeline.
#[derive(Error, Debug, Clone)]
pub enum CommandError {
    /// Transport-level failure talking to a remote channel.
    ///
    /// Transient: recovered locally as a per-device `false` result.
    #[error("link error on '{name}': {message}")]
    Link { name: String, message: String },

    /// No tester mapping exists for the device's kind.
    ///
    /// Fatal configuration error: the device-type mapping must be fixed at
    /// the source, so this is raised instead of degrading silently.
    #[error("no tester mapping for device '{device}'")]
    UnknownDeviceKind { device: DeviceId },

    /// The named operation is not part of the tester's contract.
    #[error("operation '{op}' not supported by {kind} tester '{device}'")]
    UnsupportedOperation {
        device: DeviceId,
        kind: DeviceKind,
        op: String,
    },

    /// The operation was invoked with missing or malformed parameters.
    #[error("invalid parameters for operation '{op}': {message}")]
    InvalidParams { op: String, message: String },

    /// A workflow derived contradictory expectations about device state.
    ///
    /// Surfaced as a user-facing blocking error; the workflow halts rather
    /// than guessing.
    #[error("inconsistent device state: {detail}")]
    StateConflict {
        detail: String,
        devices: Vec<DeviceId>,
    },
}

impl CommandError {
    /// Build a transport error for the named channel.
    pub fn link(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Link {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether this error must propagate instead of being absorbed into a
    /// stage's Failed list.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CommandError::Link { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_errors_are_transient() {
        let err = CommandError::link("LI-01:PS-QF1", "channel unreachable");
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "link error on 'LI-01:PS-QF1': channel unreachable"
        );
    }

    #[test]
    fn test_structural_errors_are_fatal() {
        let unknown = CommandError::UnknownDeviceKind {
            device: DeviceId::new("XX-01:YY-Z"),
        };
        assert!(unknown.is_fatal());

        let unsupported = CommandError::UnsupportedOperation {
            device: DeviceId::new("PS-A"),
            kind: DeviceKind::PowerSupply,
            op: "warp".into(),
        };
        assert!(unsupported.is_fatal());
        assert!(unsupported.to_string().contains("'warp'"));

        let conflict = CommandError::StateConflict {
            detail: "expected-off devices still on".into(),
            devices: vec![DeviceId::new("DCL-2")],
        };
        assert!(conflict.is_fatal());
    }
}
