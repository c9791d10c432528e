//! `conductor-core`
//!
//! Core trait definitions and types for the conductor device
//! command/verification pipeline.
//!
//! This crate provides the fundamental building blocks shared by the
//! hardware registry, the task engine and the simulated transport. It
//! defines the identifier types, the capability traits implemented per
//! device kind, the opaque transport seam, the progress-event model and
//! the error taxonomy.
//!
//! ## Three-Tier Architecture
//!
//! - **DeviceLink**: low-level remote-variable transport (channel access,
//!   simulation) — opaque to everything above it
//! - **DeviceTester / TriggerTester**: per-device-kind capability objects
//!   exposing named set/check operations
//! - **Tasks & Pipelines** (in `conductor-engine`): bulk command stages
//!   driving testers and aggregating per-device outcomes
//!
//! ## Key Types
//!
//! - [`DeviceId`] / [`TriggerId`] / [`TargetId`]: the units a task resolves
//! - [`OpParams`]: optional target value plus test-mode flag for an operation
//! - [`StageResult`]: the Ok/Failed aggregation of one completed stage
//! - [`ExecEvent`] / [`RunObserver`]: the progress stream consumed by the UI
//! - [`CommandError`]: transient-vs-structural error taxonomy

pub mod error;
pub mod event;
pub mod ids;
pub mod link;
pub mod tester;

pub use error::{CmdResult, CommandError};
pub use event::{
    CancelFlag, ChannelReporter, ExecEvent, NullObserver, RunObserver, SilentCollector,
    StageResult,
};
pub use ids::{dedup_ordered, DeviceId, DeviceKind, TargetId, TriggerId};
pub use link::{DeviceLink, LinkProvider};
pub use tester::{DeviceTester, OpParams, TriggerTester};
