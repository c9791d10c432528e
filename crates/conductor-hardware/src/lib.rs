//! `conductor-hardware`
//!
//! Device classification and the tester registry.
//!
//! This crate turns opaque device names into live capability objects:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       TesterRegistry                            │
//! │  classify(DeviceId) → DeviceKind → concrete tester, cached      │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                     Concrete Testers                            │
//! │  PowerSupplyTester | PulsedMagnetTester | DcLinkTester | ...    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                  DeviceLink (transport seam)                    │
//! │  remote channel access | SimLink (tests)                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The registry's cache is append-only for the process lifetime: one
//! tester per device, never evicted, never replaced. It also hosts the
//! trigger-side state: [`TriggerMap`] (device → shared trigger) and the
//! write-once [`TriggerStateCache`] used by restore workflows.

pub mod classify;
pub mod registry;
pub mod testers;
pub mod trigger;

pub use classify::{DeviceClassifier, NameClassifier};
pub use registry::TesterRegistry;
pub use testers::{DcLinkTester, PowerSupplyTester, PulsedMagnetTester, TimingTriggerTester};
pub use trigger::{TriggerMap, TriggerStateCache};
