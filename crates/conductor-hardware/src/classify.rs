//! Device classification by naming convention.
//!
//! The discipline token of a hierarchical device name selects the device
//! kind: `"LI-01:PS-QF1"` is a power supply, `"DCL-2"` a DC-link. The
//! classifier is an injected collaborator so tests can substitute a
//! counting or fixed-kind implementation.

use conductor_core::{DeviceId, DeviceKind};

/// Maps a device identifier to its kind.
///
/// Returning `None` means the device has no tester mapping — the registry
/// treats that as a fatal configuration error, never a silent skip.
pub trait DeviceClassifier: Send + Sync {
    fn classify(&self, device: &DeviceId) -> Option<DeviceKind>;
}

/// Default classifier: discipline token → kind.
#[derive(Debug, Default)]
pub struct NameClassifier;

impl DeviceClassifier for NameClassifier {
    fn classify(&self, device: &DeviceId) -> Option<DeviceKind> {
        match device.discipline() {
            "PS" => Some(DeviceKind::PowerSupply),
            "PM" | "PU" => Some(DeviceKind::PulsedMagnet),
            "DCL" => Some(DeviceKind::DcLink),
            "TI" | "TRG" => Some(DeviceKind::TimingTrigger),
            _ => None,
        }
    }
}
