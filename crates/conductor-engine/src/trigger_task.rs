//! Trigger task variants.
//!
//! Same Set/Check shape as the device tasks, but the unit of operation is
//! the shared trigger selection derived from the caller's device list
//! through a [`TriggerMap`]. Two drive modes:
//!
//! - **Explicit**: every selected trigger is driven to a caller value.
//!   Before the first drive ever touches a trigger, its current state is
//!   captured into the [`TriggerStateCache`] — first observation wins for
//!   the process lifetime.
//! - **Restore**: every selected trigger is driven back to its captured
//!   initial state. A trigger that was never observed is left untouched —
//!   a deliberate no-op, not an error.

use crate::settings::TaskSettings;
use crate::task::{resolve, Task, TaskContext};
use async_trait::async_trait;
use conductor_core::{CmdResult, DeviceId, StageResult, TargetId, TriggerId};
use conductor_hardware::{TesterRegistry, TriggerMap, TriggerStateCache};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// What a trigger task drives its selection toward.
#[derive(Debug, Clone)]
pub enum TriggerDrive {
    /// Drive every selected trigger to this value
    Explicit(Value),
    /// Drive every selected trigger to its captured initial state
    Restore,
}

// =============================================================================
// Trigger Set Task
// =============================================================================

/// Drive every selected trigger once.
pub struct TriggerSetTask {
    label: String,
    triggers: Vec<TriggerId>,
    drive: TriggerDrive,
    registry: Arc<TesterRegistry>,
    cache: Arc<TriggerStateCache>,
    settings: TaskSettings,
}

impl TriggerSetTask {
    /// Explicit-value mode over the triggers of the given devices.
    pub fn explicit(
        label: impl Into<String>,
        registry: Arc<TesterRegistry>,
        cache: Arc<TriggerStateCache>,
        map: &TriggerMap,
        devices: &[DeviceId],
        value: Value,
        settings: TaskSettings,
    ) -> Self {
        Self {
            label: label.into(),
            triggers: map.selection(devices),
            drive: TriggerDrive::Explicit(value),
            registry,
            cache,
            settings,
        }
    }

    /// Restore mode over the triggers of the given devices.
    pub fn restore(
        label: impl Into<String>,
        registry: Arc<TesterRegistry>,
        cache: Arc<TriggerStateCache>,
        map: &TriggerMap,
        devices: &[DeviceId],
        settings: TaskSettings,
    ) -> Self {
        Self {
            label: label.into(),
            triggers: map.selection(devices),
            drive: TriggerDrive::Restore,
            registry,
            cache,
            settings,
        }
    }

    /// Target value for one trigger; `None` means "leave untouched".
    fn drive_value(&self, trigger: &TriggerId) -> Option<Value> {
        match &self.drive {
            TriggerDrive::Explicit(value) => Some(value.clone()),
            TriggerDrive::Restore => self.cache.initial(trigger),
        }
    }
}

#[async_trait]
impl Task for TriggerSetTask {
    fn label(&self) -> &str {
        &self.label
    }

    fn targets(&self) -> Vec<TargetId> {
        self.triggers
            .iter()
            .filter(|t| self.drive_value(t).is_some())
            .cloned()
            .map(TargetId::Trigger)
            .collect()
    }

    async fn run(&self, ctx: &TaskContext<'_>) -> CmdResult<StageResult> {
        let mut result = StageResult::new();

        for trigger in &self.triggers {
            let Some(value) = self.drive_value(trigger) else {
                debug!(trigger = %trigger, "no captured initial state, leaving untouched");
                continue;
            };

            let target = TargetId::Trigger(trigger.clone());
            if ctx.cancel.is_cancelled() {
                resolve(ctx, &mut result, target, false);
                continue;
            }

            ctx.observer.item_started(ctx.stage, &target);

            let tester = self.registry.trigger(trigger);
            if !tester.wait_connected(self.settings.connect_timeout).await {
                debug!(trigger = %trigger, "not connected within timeout");
                resolve(ctx, &mut result, target, false);
                continue;
            }

            // A trigger is never driven before its pre-command state is
            // captured; without the capture a later restore would have
            // nothing to restore to.
            if matches!(self.drive, TriggerDrive::Explicit(_)) && !self.cache.is_captured(trigger)
            {
                match tester.state().await {
                    Ok(state) => {
                        self.cache.capture(trigger, state);
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        debug!(trigger = %trigger, error = %e, "initial state read failed");
                        resolve(ctx, &mut result, target, false);
                        continue;
                    }
                }
            }

            match tester.apply_state(&value).await {
                Ok(()) => resolve(ctx, &mut result, target, true),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!(trigger = %trigger, error = %e, "drive failed");
                    resolve(ctx, &mut result, target, false);
                }
            }
        }

        Ok(result)
    }
}

// =============================================================================
// Trigger Check Task
// =============================================================================

/// Poll every selected trigger until it reports its target state.
pub struct TriggerCheckTask {
    label: String,
    triggers: Vec<TriggerId>,
    expect: TriggerDrive,
    registry: Arc<TesterRegistry>,
    cache: Arc<TriggerStateCache>,
    settings: TaskSettings,
}

impl TriggerCheckTask {
    /// Verify every selected trigger reports the given value.
    pub fn explicit(
        label: impl Into<String>,
        registry: Arc<TesterRegistry>,
        cache: Arc<TriggerStateCache>,
        map: &TriggerMap,
        devices: &[DeviceId],
        value: Value,
        settings: TaskSettings,
    ) -> Self {
        Self {
            label: label.into(),
            triggers: map.selection(devices),
            expect: TriggerDrive::Explicit(value),
            registry,
            cache,
            settings,
        }
    }

    /// Verify every selected trigger reports its captured initial state.
    pub fn restore(
        label: impl Into<String>,
        registry: Arc<TesterRegistry>,
        cache: Arc<TriggerStateCache>,
        map: &TriggerMap,
        devices: &[DeviceId],
        settings: TaskSettings,
    ) -> Self {
        Self {
            label: label.into(),
            triggers: map.selection(devices),
            expect: TriggerDrive::Restore,
            registry,
            cache,
            settings,
        }
    }

    /// Expected values per trigger, skipping never-captured ones in
    /// restore mode.
    fn expectations(&self) -> Vec<(TriggerId, Value)> {
        self.triggers
            .iter()
            .filter_map(|trigger| match &self.expect {
                TriggerDrive::Explicit(value) => Some((trigger.clone(), value.clone())),
                TriggerDrive::Restore => self
                    .cache
                    .initial(trigger)
                    .map(|value| (trigger.clone(), value)),
            })
            .collect()
    }
}

#[async_trait]
impl Task for TriggerCheckTask {
    fn label(&self) -> &str {
        &self.label
    }

    fn targets(&self) -> Vec<TargetId> {
        self.expectations()
            .into_iter()
            .map(|(trigger, _)| TargetId::Trigger(trigger))
            .collect()
    }

    async fn run(&self, ctx: &TaskContext<'_>) -> CmdResult<StageResult> {
        let mut result = StageResult::new();
        let mut pending = self.expectations();
        let deadline = Instant::now() + self.settings.check_timeout;

        'poll: loop {
            let mut index = 0;
            while index < pending.len() {
                if ctx.cancel.is_cancelled() {
                    warn!(task = %self.label, "cancellation requested, stopping check loop");
                    break 'poll;
                }

                let (trigger, expected) = pending[index].clone();
                let tester = self.registry.trigger(&trigger);

                let satisfied = if tester.wait_connected(self.settings.connect_timeout).await {
                    match tester.check_state(&expected).await {
                        Ok(satisfied) => satisfied,
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            debug!(trigger = %trigger, error = %e, "check failed");
                            false
                        }
                    }
                } else {
                    false
                };

                if satisfied {
                    pending.remove(index);
                    resolve(ctx, &mut result, TargetId::Trigger(trigger), true);
                } else {
                    index += 1;
                }
            }

            if pending.is_empty() || ctx.cancel.is_cancelled() || Instant::now() >= deadline {
                break;
            }
            sleep(self.settings.debounce).await;
        }

        for (trigger, _) in pending {
            resolve(ctx, &mut result, TargetId::Trigger(trigger), false);
        }

        Ok(result)
    }
}
