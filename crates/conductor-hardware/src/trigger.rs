//! Trigger topology and initial-state capture.
//!
//! Many devices reference one shared trigger through their timing
//! configuration; [`TriggerMap`] holds that device → trigger assignment
//! and derives the ordered, deduplicated trigger selection for a device
//! list. [`TriggerStateCache`] records each trigger's state the first
//! time it is ever touched in this process — write-once per key — so
//! restore workflows are idempotent and reproducible no matter how many
//! times the trigger has since been toggled.

use conductor_core::{DeviceId, TriggerId};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Device → shared trigger assignment.
///
/// Built from the (excluded) timing topology service; immutable once
/// constructed.
#[derive(Debug, Clone, Default)]
pub struct TriggerMap {
    assignments: HashMap<DeviceId, TriggerId>,
}

impl TriggerMap {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (DeviceId, TriggerId)>) -> Self {
        Self {
            assignments: pairs.into_iter().collect(),
        }
    }

    /// The trigger assigned to a device, if any.
    pub fn trigger_of(&self, device: &DeviceId) -> Option<&TriggerId> {
        self.assignments.get(device)
    }

    /// Ordered, deduplicated triggers referenced by the given devices.
    ///
    /// Devices without a trigger assignment are skipped; order follows
    /// the first device that references each trigger.
    pub fn selection(&self, devices: &[DeviceId]) -> Vec<TriggerId> {
        let mut seen = HashSet::new();
        let mut selection = Vec::new();
        for device in devices {
            match self.assignments.get(device) {
                Some(trigger) => {
                    if seen.insert(trigger.clone()) {
                        selection.push(trigger.clone());
                    }
                }
                None => {
                    debug!(device = %device, "device has no trigger assignment");
                }
            }
        }
        selection
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// Write-once cache of each trigger's first-observed state.
///
/// Process-wide lifetime; an entry, once set, is immutable. Triggers
/// never observed simply have no entry — restore paths treat that as
/// "leave untouched".
#[derive(Debug, Default)]
pub struct TriggerStateCache {
    initial: Mutex<HashMap<TriggerId, Value>>,
}

impl TriggerStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the trigger's state unless one is already captured.
    ///
    /// Returns true when this call populated the entry. First
    /// observation wins for the lifetime of the process.
    pub fn capture(&self, trigger: &TriggerId, state: Value) -> bool {
        let mut initial = self.initial.lock();
        if initial.contains_key(trigger) {
            return false;
        }
        debug!(trigger = %trigger, state = %state, "captured initial trigger state");
        initial.insert(trigger.clone(), state);
        true
    }

    /// The first-observed state of a trigger, if it was ever captured.
    pub fn initial(&self, trigger: &TriggerId) -> Option<Value> {
        self.initial.lock().get(trigger).cloned()
    }

    pub fn is_captured(&self, trigger: &TriggerId) -> bool {
        self.initial.lock().contains_key(trigger)
    }

    pub fn len(&self) -> usize {
        self.initial.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.initial.lock().is_empty()
    }
}
