//! Atomic pipeline stages: set and check tasks.
//!
//! A task is one loop over its device list. A [`SetTask`] applies a named
//! operation to every device once — fire-and-forget, no blocking beyond
//! the connection timeout; verification belongs to the paired
//! [`CheckTask`], which polls every device until its predicate holds or
//! the wall-clock budget runs out.
//!
//! Resolution discipline: every device of a task is resolved exactly
//! once, either when it succeeds or, for everything still pending at loop
//! exit, as a terminal failure — reported last, in input order. Transient
//! link failures are absorbed into the Failed set; structural errors
//! (unknown kind, unsupported op) propagate and abort the stage.

use crate::settings::TaskSettings;
use async_trait::async_trait;
use conductor_core::{
    dedup_ordered, CancelFlag, CmdResult, DeviceId, OpParams, RunObserver, StageResult, TargetId,
};
use conductor_hardware::TesterRegistry;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

// =============================================================================
// Task Trait
// =============================================================================

/// Per-stage execution context handed to a task by the pipeline.
pub struct TaskContext<'a> {
    /// Index of this stage within its pipeline
    pub stage: usize,
    /// Progress receiver (visible reporter or silent collector)
    pub observer: &'a dyn RunObserver,
    /// Cooperative cancellation flag shared across the pipeline
    pub cancel: &'a CancelFlag,
}

/// One atomic pipeline stage.
#[async_trait]
pub trait Task: Send + Sync {
    /// Human-readable stage label
    fn label(&self) -> &str;

    /// The distinct targets this task will resolve
    fn targets(&self) -> Vec<TargetId>;

    /// Run the stage to completion, resolving every target exactly once.
    async fn run(&self, ctx: &TaskContext<'_>) -> CmdResult<StageResult>;
}

/// Record one resolution and forward it to the observer.
pub(crate) fn resolve(
    ctx: &TaskContext<'_>,
    result: &mut StageResult,
    target: TargetId,
    ok: bool,
) {
    ctx.observer.item_resolved(ctx.stage, &target, ok);
    result.record(target, ok);
}

// =============================================================================
// Set Task
// =============================================================================

/// Apply one named operation to every device once.
pub struct SetTask {
    label: String,
    devices: Vec<DeviceId>,
    op: String,
    params: OpParams,
    registry: Arc<TesterRegistry>,
    settings: TaskSettings,
}

impl SetTask {
    pub fn new(
        label: impl Into<String>,
        registry: Arc<TesterRegistry>,
        devices: &[DeviceId],
        op: impl Into<String>,
        params: OpParams,
        settings: TaskSettings,
    ) -> Self {
        Self {
            label: label.into(),
            devices: dedup_ordered(devices),
            op: op.into(),
            params,
            registry,
            settings,
        }
    }
}

#[async_trait]
impl Task for SetTask {
    fn label(&self) -> &str {
        &self.label
    }

    fn targets(&self) -> Vec<TargetId> {
        self.devices.iter().cloned().map(TargetId::Device).collect()
    }

    async fn run(&self, ctx: &TaskContext<'_>) -> CmdResult<StageResult> {
        let mut result = StageResult::new();

        for (index, device) in self.devices.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                warn!(task = %self.label, "cancellation requested, skipping remaining devices");
                for skipped in &self.devices[index..] {
                    resolve(ctx, &mut result, TargetId::Device(skipped.clone()), false);
                }
                return Ok(result);
            }

            let target = TargetId::Device(device.clone());
            ctx.observer.item_started(ctx.stage, &target);

            let tester = self.registry.get_or_create(device)?;
            if !tester.wait_connected(self.settings.connect_timeout).await {
                debug!(device = %device, "not connected within timeout");
                resolve(ctx, &mut result, target, false);
                continue;
            }

            match tester.apply(&self.op, &self.params).await {
                Ok(()) => resolve(ctx, &mut result, target, true),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!(device = %device, op = %self.op, error = %e, "apply failed");
                    resolve(ctx, &mut result, target, false);
                }
            }
        }

        Ok(result)
    }
}

// =============================================================================
// Check Task
// =============================================================================

/// Poll every device until its predicate holds or the budget runs out.
pub struct CheckTask {
    label: String,
    devices: Vec<DeviceId>,
    op: String,
    params: OpParams,
    registry: Arc<TesterRegistry>,
    settings: TaskSettings,
}

impl CheckTask {
    pub fn new(
        label: impl Into<String>,
        registry: Arc<TesterRegistry>,
        devices: &[DeviceId],
        op: impl Into<String>,
        params: OpParams,
        settings: TaskSettings,
    ) -> Self {
        Self {
            label: label.into(),
            devices: dedup_ordered(devices),
            op: op.into(),
            params,
            registry,
            settings,
        }
    }

    /// Override the check budget for this task only.
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.settings.check_timeout = timeout;
        self
    }
}

#[async_trait]
impl Task for CheckTask {
    fn label(&self) -> &str {
        &self.label
    }

    fn targets(&self) -> Vec<TargetId> {
        self.devices.iter().cloned().map(TargetId::Device).collect()
    }

    async fn run(&self, ctx: &TaskContext<'_>) -> CmdResult<StageResult> {
        let mut result = StageResult::new();
        // Working set keeps input order, so the terminal failure report
        // below preserves it.
        let mut pending: Vec<DeviceId> = self.devices.clone();
        let deadline = Instant::now() + self.settings.check_timeout;

        'poll: loop {
            let mut index = 0;
            while index < pending.len() {
                if ctx.cancel.is_cancelled() {
                    warn!(task = %self.label, "cancellation requested, stopping check loop");
                    break 'poll;
                }

                let device = pending[index].clone();
                let tester = self.registry.get_or_create(&device)?;

                let satisfied = if tester.wait_connected(self.settings.connect_timeout).await {
                    match tester.check(&self.op, &self.params).await {
                        Ok(satisfied) => satisfied,
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            debug!(device = %device, op = %self.op, error = %e, "check failed");
                            false
                        }
                    }
                } else {
                    false
                };

                if satisfied {
                    pending.remove(index);
                    resolve(ctx, &mut result, TargetId::Device(device), true);
                } else {
                    index += 1;
                }
            }

            if pending.is_empty() || ctx.cancel.is_cancelled() || Instant::now() >= deadline {
                break;
            }
            sleep(self.settings.debounce).await;
        }

        // Everything still pending is resolved exactly once as failed,
        // in input order.
        for device in pending {
            resolve(ctx, &mut result, TargetId::Device(device), false);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::{CommandError, DeviceLink, NullObserver, SilentCollector};
    use conductor_driver_sim::{ConnectBehavior, SimLink, SimLinkProvider};
    use conductor_hardware::NameClassifier;
    use serde_json::json;
    use std::time::Duration;

    fn fast_settings() -> TaskSettings {
        TaskSettings::default()
            .with_connect_timeout(Duration::from_millis(20))
            .with_debounce(Duration::from_millis(10))
            .with_check_timeout(Duration::from_millis(100))
    }

    fn registry_over(provider: Arc<SimLinkProvider>) -> Arc<TesterRegistry> {
        Arc::new(TesterRegistry::new(NameClassifier, provider))
    }

    fn devices(names: &[&str]) -> Vec<DeviceId> {
        names.iter().map(|n| DeviceId::new(*n)).collect()
    }

    async fn run_task(task: &dyn Task) -> StageResult {
        let cancel = CancelFlag::new();
        let observer = NullObserver;
        let ctx = TaskContext {
            stage: 0,
            observer: &observer,
            cancel: &cancel,
        };
        task.run(&ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_set_applies_to_every_device_once() {
        let provider = Arc::new(SimLinkProvider::new());
        let a = provider.insert(SimLink::builder("PS-A").build());
        let b = provider.insert(SimLink::builder("PS-B").build());
        let registry = registry_over(provider);

        let task = SetTask::new(
            "power on",
            registry,
            &devices(&["PS-A", "PS-B", "PS-A"]), // duplicate collapses
            "pwrstate",
            OpParams::value(json!("on")),
            fast_settings(),
        );

        let result = run_task(&task).await;
        assert_eq!(result.len(), 2, "duplicates are removed on construction");
        assert!(result.all_ok());
        assert_eq!(a.puts_for("pwrstate"), 1);
        assert_eq!(b.puts_for("pwrstate"), 1);
    }

    #[tokio::test]
    async fn test_set_absorbs_connection_failure_and_continues() {
        let provider = Arc::new(SimLinkProvider::new());
        provider.insert(
            SimLink::builder("PS-A")
                .connect(ConnectBehavior::Never)
                .build(),
        );
        let b = provider.insert(SimLink::builder("PS-B").build());
        let registry = registry_over(provider);

        let task = SetTask::new(
            "power on",
            registry,
            &devices(&["PS-A", "PS-B"]),
            "pwrstate",
            OpParams::value(json!("on")),
            fast_settings(),
        );

        let result = run_task(&task).await;
        let failed: Vec<&str> = result.failed_devices().map(DeviceId::as_str).collect();
        assert_eq!(failed, vec!["PS-A"]);
        // The unreachable device did not stop the pass.
        assert_eq!(b.puts_for("pwrstate"), 1);
    }

    #[tokio::test]
    async fn test_set_propagates_fatal_errors() {
        let provider = Arc::new(SimLinkProvider::new());
        let registry = registry_over(provider);

        let task = SetTask::new(
            "power on",
            registry,
            &devices(&["SI-01:XX-Thing"]),
            "pwrstate",
            OpParams::value(json!("on")),
            fast_settings(),
        );

        let cancel = CancelFlag::new();
        let observer = NullObserver;
        let ctx = TaskContext {
            stage: 0,
            observer: &observer,
            cancel: &cancel,
        };
        let err = task.run(&ctx).await.unwrap_err();
        assert!(matches!(err, CommandError::UnknownDeviceKind { .. }));
    }

    #[tokio::test]
    async fn test_set_cancellation_skips_remaining() {
        let provider = Arc::new(SimLinkProvider::new());
        let a = provider.insert(SimLink::builder("PS-A").build());
        let registry = registry_over(provider);

        let task = SetTask::new(
            "power on",
            registry,
            &devices(&["PS-A", "PS-B"]),
            "pwrstate",
            OpParams::value(json!("on")),
            fast_settings(),
        );

        let cancel = CancelFlag::new();
        cancel.cancel();
        let observer = NullObserver;
        let ctx = TaskContext {
            stage: 0,
            observer: &observer,
            cancel: &cancel,
        };

        let result = task.run(&ctx).await.unwrap();
        // Every device resolved exactly once, all as not attempted.
        assert_eq!(result.len(), 2);
        assert!(result.ok.is_empty());
        assert_eq!(a.put_count(), 0);
    }

    #[tokio::test]
    async fn test_check_polls_until_value_settles() {
        let provider = Arc::new(SimLinkProvider::new());
        let link = provider.insert(
            SimLink::builder("PS-A")
                .field("pwrstate", json!("off"))
                .settle(Duration::from_millis(30))
                .build(),
        );
        let registry = registry_over(provider);

        link.put("pwrstate", json!("on")).await.unwrap();

        let task = CheckTask::new(
            "verify power",
            registry,
            &devices(&["PS-A"]),
            "pwrstate",
            OpParams::value(json!("on")),
            fast_settings(),
        );

        let result = run_task(&task).await;
        assert!(result.all_ok(), "check must poll past the settle delay");
        assert!(link.get_count() > 1, "confirmation took more than one poll");
    }

    #[tokio::test]
    async fn test_check_timeout_scenario() {
        // Devices ["PS-A", "PS-B"]: PS-A connects and confirms quickly,
        // PS-B never connects. The stage terminates at the budget with
        // Ok = {PS-A}, Failed = {PS-B}.
        let provider = Arc::new(SimLinkProvider::new());
        provider.insert(
            SimLink::builder("PS-A")
                .field("pwrstate", json!("on"))
                .connect(ConnectBehavior::After(Duration::from_millis(15)))
                .build(),
        );
        provider.insert(
            SimLink::builder("PS-B")
                .connect(ConnectBehavior::Never)
                .build(),
        );
        let registry = registry_over(provider);

        let task = CheckTask::new(
            "verify power",
            registry,
            &devices(&["PS-A", "PS-B"]),
            "pwrstate",
            OpParams::value(json!("on")),
            fast_settings(),
        )
        .with_timeout(Duration::from_millis(150));

        let started = Instant::now();
        let result = run_task(&task).await;
        let elapsed = started.elapsed();

        let ok: Vec<&str> = result.ok_devices().map(DeviceId::as_str).collect();
        let failed: Vec<&str> = result.failed_devices().map(DeviceId::as_str).collect();
        assert_eq!(ok, vec!["PS-A"]);
        assert_eq!(failed, vec!["PS-B"]);
        assert!(
            elapsed >= Duration::from_millis(150),
            "stage ended before the budget: {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_check_failures_reported_last_in_input_order() {
        let provider = Arc::new(SimLinkProvider::new());
        for name in ["PS-1", "PS-2", "PS-3", "PS-4"] {
            provider.insert(SimLink::builder(name).field("pwrstate", json!("off")).build());
        }
        // Only PS-3 satisfies the predicate.
        provider
            .get("PS-3")
            .unwrap()
            .force("pwrstate", json!("on"));
        let registry = registry_over(provider);

        let collector = SilentCollector::new();
        let cancel = CancelFlag::new();
        let ctx = TaskContext {
            stage: 0,
            observer: &collector,
            cancel: &cancel,
        };

        let task = CheckTask::new(
            "verify power",
            registry,
            &devices(&["PS-1", "PS-2", "PS-3", "PS-4"]),
            "pwrstate",
            OpParams::value(json!("on")),
            fast_settings().with_check_timeout(Duration::from_millis(40)),
        );
        let result = task.run(&ctx).await.unwrap();

        assert_eq!(result.len(), 4);
        let failed: Vec<&str> = result.failed_devices().map(DeviceId::as_str).collect();
        assert_eq!(failed, vec!["PS-1", "PS-2", "PS-4"], "input order preserved");
    }

    /// Observer that requests cancellation as soon as any item resolves.
    struct CancelOnFirstResolve {
        cancel: CancelFlag,
    }

    impl RunObserver for CancelOnFirstResolve {
        fn item_resolved(&self, _stage: usize, _target: &TargetId, _ok: bool) {
            self.cancel.cancel();
        }
    }

    #[tokio::test]
    async fn test_check_cancellation_is_monotonic() {
        // PS-A resolves on the first round; cancellation then lands before
        // PS-B ever can. PS-A keeps its resolved outcome, PS-B fails.
        let provider = Arc::new(SimLinkProvider::new());
        provider.insert(SimLink::builder("PS-A").field("pwrstate", json!("on")).build());
        provider.insert(SimLink::builder("PS-B").field("pwrstate", json!("off")).build());
        let registry = registry_over(provider);

        let cancel = CancelFlag::new();
        let observer = CancelOnFirstResolve {
            cancel: cancel.clone(),
        };
        let ctx = TaskContext {
            stage: 0,
            observer: &observer,
            cancel: &cancel,
        };

        let task = CheckTask::new(
            "verify power",
            registry,
            &devices(&["PS-A", "PS-B"]),
            "pwrstate",
            OpParams::value(json!("on")),
            fast_settings(),
        );
        let result = task.run(&ctx).await.unwrap();

        let ok: Vec<&str> = result.ok_devices().map(DeviceId::as_str).collect();
        let failed: Vec<&str> = result.failed_devices().map(DeviceId::as_str).collect();
        assert_eq!(ok, vec!["PS-A"]);
        assert_eq!(failed, vec!["PS-B"]);
    }

    #[tokio::test]
    async fn test_repeated_set_on_satisfied_devices_is_idempotent() {
        let provider = Arc::new(SimLinkProvider::new());
        provider.insert(SimLink::builder("PS-A").field("pwrstate", json!("on")).build());
        provider.insert(SimLink::builder("PS-B").field("pwrstate", json!("on")).build());
        let registry = registry_over(provider);

        for _ in 0..2 {
            let set = SetTask::new(
                "power on",
                registry.clone(),
                &devices(&["PS-A", "PS-B"]),
                "pwrstate",
                OpParams::value(json!("on")),
                fast_settings(),
            );
            let check = CheckTask::new(
                "verify power",
                registry.clone(),
                &devices(&["PS-A", "PS-B"]),
                "pwrstate",
                OpParams::value(json!("on")),
                fast_settings(),
            );
            assert!(run_task(&set).await.all_ok());
            assert!(run_task(&check).await.all_ok());
        }
    }
}
