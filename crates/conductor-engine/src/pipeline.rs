//! Pipeline sequencer.
//!
//! Runs an ordered list of tasks strictly sequentially: stage N runs to
//! completion — its terminal stage-completed callback fires — before
//! stage N+1 starts. The sequencer exposes the running aggregate via
//! observer callbacks only and keeps no result store of its own; callers
//! that need the `StageResult`s collect them (see
//! [`conductor_core::SilentCollector`]).
//!
//! Execute-forward-only: cancellation stops the currently running task
//! and prevents later stages from starting, but completed stages are
//! never rolled back.

use crate::task::{Task, TaskContext};
use conductor_core::{CancelFlag, CmdResult, RunObserver};
use tracing::info;

/// An ordered sequence of tasks executed to completion, one at a time.
///
/// Transient: built fresh for each user-invoked command and discarded
/// after the run.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Task>>,
    cancel: CancelFlag,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage (builder style).
    pub fn stage(mut self, task: impl Task + 'static) -> Self {
        self.stages.push(Box::new(task));
        self
    }

    /// Append a boxed stage.
    pub fn push(&mut self, task: Box<dyn Task>) {
        self.stages.push(task);
    }

    /// Handle for requesting cancellation of the running pipeline.
    ///
    /// Affects the currently running task and prevents later stages from
    /// starting; already-completed stages are not rolled back.
    pub fn cancel_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage to completion, in order.
    ///
    /// The observer choice selects visible vs. silent mode. Fatal
    /// configuration errors propagate; per-device failures are part of
    /// each stage's result, never an error.
    pub async fn run(&self, observer: &dyn RunObserver) -> CmdResult<()> {
        for (index, task) in self.stages.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(stage = index, label = task.label(), "pipeline cancelled, skipping stage");
                break;
            }

            info!(stage = index, label = task.label(), "stage started");
            let ctx = TaskContext {
                stage: index,
                observer,
                cancel: &self.cancel,
            };
            let result = task.run(&ctx).await?;
            observer.stage_completed(index, task.label(), &result);
            info!(
                stage = index,
                label = task.label(),
                ok = result.ok.len(),
                failed = result.failed.len(),
                "stage completed"
            );
        }

        Ok(())
    }
}
