//! Device and trigger identifiers.
//!
//! Devices are addressed by hierarchical control-system names of the form
//! `"SEC-SUB:DIS-DEV"` (e.g. `"LI-01:PS-QF1"`), where the discipline token
//! (`"PS"`) drives tester classification. Identifiers are opaque beyond
//! that: they are compared, hashed and displayed, never parsed further.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

// =============================================================================
// DeviceId / TriggerId
// =============================================================================

/// Identifier of one remotely controllable device.
///
/// Used as a map key everywhere; immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Discipline token of the hierarchical name.
    ///
    /// `"LI-01:PS-QF1"` → `"PS"`, `"DCL-2"` → `"DCL"`. Falls back to the
    /// whole name when no separator is present.
    pub fn discipline(&self) -> &str {
        let tail = self.0.rsplit(':').next().unwrap_or(&self.0);
        tail.split('-').next().unwrap_or(tail)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Identifier of a shared timing trigger channel.
///
/// Distinct from [`DeviceId`]: many devices may reference the same trigger
/// through their timing configuration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerId(String);

impl TriggerId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TriggerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

// =============================================================================
// TargetId
// =============================================================================

/// The unit a task resolves: a device, or a shared trigger.
///
/// Progress events and [`crate::StageResult`]s carry these, so one event
/// stream serves both device tasks and trigger tasks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetId {
    Device(DeviceId),
    Trigger(TriggerId),
}

impl TargetId {
    /// The device identifier, if this target is a device.
    pub fn device(&self) -> Option<&DeviceId> {
        match self {
            TargetId::Device(d) => Some(d),
            TargetId::Trigger(_) => None,
        }
    }

    /// The trigger identifier, if this target is a trigger.
    pub fn trigger(&self) -> Option<&TriggerId> {
        match self {
            TargetId::Device(_) => None,
            TargetId::Trigger(t) => Some(t),
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetId::Device(d) => d.fmt(f),
            TargetId::Trigger(t) => t.fmt(f),
        }
    }
}

impl From<DeviceId> for TargetId {
    fn from(d: DeviceId) -> Self {
        TargetId::Device(d)
    }
}

impl From<TriggerId> for TargetId {
    fn from(t: TriggerId) -> Self {
        TargetId::Trigger(t)
    }
}

// =============================================================================
// Device Kind
// =============================================================================

/// Device kind produced by classification.
///
/// Selects which concrete tester the registry constructs for a device.
/// Classification itself lives in `conductor-hardware`; this enum is core
/// so the error taxonomy can name kinds without a dependency cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Magnet power supplies (slow correctors, quadrupoles, dipoles)
    PowerSupply,
    /// Pulsed magnets (kickers, septa)
    PulsedMagnet,
    /// DC-link supplies feeding downstream power supplies
    DcLink,
    /// Timing trigger channels
    TimingTrigger,
}

impl DeviceKind {
    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::PowerSupply => "power supply",
            Self::PulsedMagnet => "pulsed magnet",
            Self::DcLink => "DC-link",
            Self::TimingTrigger => "timing trigger",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Deduplicate while preserving first-occurrence order.
///
/// Task device lists are deduplicated on construction: a device never
/// appears twice within one task.
pub fn dedup_ordered<T>(items: &[T]) -> Vec<T>
where
    T: Clone + Eq + Hash,
{
    let mut seen = HashSet::with_capacity(items.len());
    items
        .iter()
        .filter(|item| seen.insert((*item).clone()))
        .cloned()
        .collect()
}
