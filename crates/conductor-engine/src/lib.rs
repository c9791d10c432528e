//! `conductor-engine`
//!
//! The bulk command/verification engine: atomic tasks, the pipeline
//! sequencer and the workflow composition helpers.
//!
//! # Execution Model
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Workflow (run_ensure / run_gated)                            │
//! │   silent probe → branch on Ok/Failed → visible pipeline      │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Pipeline                                                     │
//! │   stage N runs to completion before stage N+1 starts         │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ SetTask / CheckTask / TriggerSetTask / TriggerCheckTask      │
//! │   one loop over the device (or trigger) list                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! One worker drives a pipeline's tasks strictly sequentially. Tasks
//! report per-item `(target, success)` resolutions plus one terminal
//! stage-completed signal through the observer passed to
//! [`Pipeline::run`]; cancellation is cooperative via [`conductor_core::CancelFlag`].

pub mod pipeline;
pub mod settings;
pub mod task;
pub mod trigger_task;
pub mod workflow;

pub use pipeline::Pipeline;
pub use settings::TaskSettings;
pub use task::{CheckTask, SetTask, Task, TaskContext};
pub use trigger_task::{TriggerCheckTask, TriggerDrive, TriggerSetTask};
pub use workflow::{probe, run_ensure, run_gated, EnsureSpec, GatedSpec, OpStep, TopologyLookup};
