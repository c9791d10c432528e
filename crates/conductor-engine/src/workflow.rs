//! Workflow composition: silent probes and branch-on-aggregate patterns.
//!
//! A workflow runs a pipeline in silent mode to answer a yes/no question
//! about current device state, branches on the accumulated Ok/Failed
//! sets, and runs a second, visible pipeline only over the subset that
//! actually needs action.
//!
//! The branching policies are configuration data — [`EnsureSpec`] and
//! [`GatedSpec`] are plain deserializable structs naming operations,
//! parameters and timeouts — consumed by the generic runners
//! [`run_ensure`] and [`run_gated`]. The engine encodes no
//! accelerator-specific sequencing knowledge; the one non-data element is
//! the injected [`TopologyLookup`] collaborator that computes derived
//! device sets.

use crate::pipeline::Pipeline;
use crate::settings::TaskSettings;
use crate::task::{CheckTask, SetTask, Task};
use conductor_core::{
    dedup_ordered, CmdResult, CommandError, DeviceId, OpParams, RunObserver, SilentCollector,
    StageResult, TargetId,
};
use conductor_hardware::TesterRegistry;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

// =============================================================================
// Collaborators and policy data
// =============================================================================

/// External topology collaborator.
///
/// Computes the device set derived from one device — e.g. the power
/// supplies fed by a DC-link.
pub trait TopologyLookup: Send + Sync {
    fn derived(&self, device: &DeviceId) -> Vec<DeviceId>;
}

/// One pipeline step of a workflow policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OpStep {
    /// Fire-and-forget set pass
    Set {
        op: String,
        #[serde(default)]
        params: OpParams,
    },
    /// Poll-until-satisfied check
    Check {
        op: String,
        #[serde(default)]
        params: OpParams,
        /// Override of the settings' check budget for this step
        #[serde(default, with = "humantime_serde")]
        timeout: Option<Duration>,
    },
}

impl OpStep {
    fn to_task(
        &self,
        label: &str,
        registry: &Arc<TesterRegistry>,
        devices: &[DeviceId],
        settings: &TaskSettings,
    ) -> Box<dyn Task> {
        match self {
            OpStep::Set { op, params } => Box::new(SetTask::new(
                format!("{}: {}", label, op),
                registry.clone(),
                devices,
                op.clone(),
                params.clone(),
                settings.clone(),
            )),
            OpStep::Check {
                op,
                params,
                timeout,
            } => {
                let mut step_settings = settings.clone();
                if let Some(timeout) = timeout {
                    step_settings.check_timeout = *timeout;
                }
                Box::new(CheckTask::new(
                    format!("{}: verify {}", label, op),
                    registry.clone(),
                    devices,
                    op.clone(),
                    params.clone(),
                    step_settings,
                ))
            }
        }
    }
}

// =============================================================================
// Silent probe
// =============================================================================

/// Run a one-stage silent check and hand its result to the caller.
///
/// Progress goes into a private accumulator instead of the user-visible
/// report; only the aggregation comes back.
pub async fn probe(
    registry: &Arc<TesterRegistry>,
    devices: &[DeviceId],
    op: &str,
    params: &OpParams,
    settings: &TaskSettings,
    label: &str,
) -> CmdResult<StageResult> {
    let collector = SilentCollector::new();
    let task = CheckTask::new(
        label,
        registry.clone(),
        devices,
        op,
        params.clone(),
        settings.clone(),
    );
    Pipeline::new().stage(task).run(&collector).await?;
    Ok(collector.last().unwrap_or_default())
}

/// Observer tee: forwards to the caller's observer while privately
/// collecting stage results for branching.
struct Recording<'a> {
    inner: &'a dyn RunObserver,
    collector: SilentCollector,
}

impl<'a> Recording<'a> {
    fn new(inner: &'a dyn RunObserver) -> Self {
        Self {
            inner,
            collector: SilentCollector::new(),
        }
    }
}

impl RunObserver for Recording<'_> {
    fn item_started(&self, stage: usize, target: &TargetId) {
        self.inner.item_started(stage, target);
    }

    fn item_resolved(&self, stage: usize, target: &TargetId, ok: bool) {
        self.inner.item_resolved(stage, target, ok);
    }

    fn stage_completed(&self, stage: usize, label: &str, result: &StageResult) {
        self.inner.stage_completed(stage, label, result);
        self.collector.stage_completed(stage, label, result);
    }
}

// =============================================================================
// Ensure workflow (idempotent skip)
// =============================================================================

/// Policy: drive a device set into a goal state unless it is already
/// there.
#[derive(Debug, Clone, Deserialize)]
pub struct EnsureSpec {
    pub label: String,
    /// Check/set operation naming the goal
    pub goal_op: String,
    #[serde(default)]
    pub goal: OpParams,
    /// Steps issued to unsatisfied devices before the final goal set
    /// (e.g. a `reset` clearing latched interlocks)
    #[serde(default)]
    pub prepare: Vec<OpStep>,
    #[serde(default)]
    pub settings: TaskSettings,
}

/// Run an [`EnsureSpec`] over a device set.
///
/// A silent probe decides the branch: when every device already
/// satisfies the goal, the devices are reported Ok through the visible
/// observer and no set is issued — repeated invocation is a no-op.
/// Otherwise a visible pipeline drives exactly the unsatisfied subset.
pub async fn run_ensure(
    registry: &Arc<TesterRegistry>,
    spec: &EnsureSpec,
    devices: &[DeviceId],
    observer: &dyn RunObserver,
) -> CmdResult<StageResult> {
    let devices = dedup_ordered(devices);
    let probe_label = format!("{} (probe)", spec.label);
    let current = probe(
        registry,
        &devices,
        &spec.goal_op,
        &spec.goal,
        &spec.settings,
        &probe_label,
    )
    .await?;

    if current.all_ok() {
        // Idempotent skip: log everything as Ok, issue nothing.
        info!(workflow = %spec.label, devices = devices.len(), "goal already satisfied, nothing to do");
        let mut result = StageResult::new();
        for device in &devices {
            let target = TargetId::Device(device.clone());
            observer.item_resolved(0, &target, true);
            result.record(target, true);
        }
        observer.stage_completed(0, &spec.label, &result);
        return Ok(result);
    }

    let needy: Vec<DeviceId> = current.failed_devices().cloned().collect();
    info!(
        workflow = %spec.label,
        needy = needy.len(),
        total = devices.len(),
        "driving unsatisfied devices"
    );

    let mut pipeline = Pipeline::new();
    for step in &spec.prepare {
        pipeline.push(step.to_task(&spec.label, registry, &needy, &spec.settings));
    }
    pipeline.push(Box::new(SetTask::new(
        format!("{}: {}", spec.label, spec.goal_op),
        registry.clone(),
        &needy,
        spec.goal_op.clone(),
        spec.goal.clone(),
        spec.settings.clone(),
    )));
    pipeline.push(Box::new(CheckTask::new(
        format!("{}: verify {}", spec.label, spec.goal_op),
        registry.clone(),
        &needy,
        spec.goal_op.clone(),
        spec.goal.clone(),
        spec.settings.clone(),
    )));

    let recorder = Recording::new(observer);
    pipeline.run(&recorder).await?;
    let verified = recorder.collector.last().unwrap_or_default();

    // Devices that were already satisfied stay Ok; the driven subset
    // takes the verification outcome.
    let mut result = StageResult::new();
    for device in current.ok_devices() {
        result.record(TargetId::Device(device.clone()), true);
    }
    for target in verified.ok {
        result.record(target, true);
    }
    for target in verified.failed {
        result.record(target, false);
    }
    Ok(result)
}

// =============================================================================
// Gated workflow (fan-out on failure class)
// =============================================================================

/// Policy: act on the devices derived from upstream devices that were
/// not yet in their gate state.
#[derive(Debug, Clone, Deserialize)]
pub struct GatedSpec {
    pub label: String,
    /// Predicate every upstream device must satisfy before fan-out
    pub gate_op: String,
    #[serde(default)]
    pub gate: OpParams,
    /// Steps driving offending upstream devices toward the gate state;
    /// defaults to set-then-verify of the gate operation
    #[serde(default)]
    pub remediation: Vec<OpStep>,
    /// Main stages, run only over the derived set of offending upstreams
    pub main: Vec<OpStep>,
    #[serde(default)]
    pub settings: TaskSettings,
}

/// Run a [`GatedSpec`] over an upstream device set.
///
/// A silent probe splits the upstream set; offenders are remediated
/// through a visible pipeline and re-probed. Offenders that still
/// violate the gate after remediation are a data inconsistency: the
/// workflow halts with [`CommandError::StateConflict`] instead of
/// guessing. The main stages then run only over the devices derived
/// (via [`TopologyLookup`]) from the originally offending upstreams —
/// derived sets of already-satisfied upstreams are never touched.
pub async fn run_gated(
    registry: &Arc<TesterRegistry>,
    topology: &dyn TopologyLookup,
    spec: &GatedSpec,
    upstream: &[DeviceId],
    observer: &dyn RunObserver,
) -> CmdResult<StageResult> {
    let upstream = dedup_ordered(upstream);
    let gate_label = format!("{} (gate probe)", spec.label);
    let gate_result = probe(
        registry,
        &upstream,
        &spec.gate_op,
        &spec.gate,
        &spec.settings,
        &gate_label,
    )
    .await?;

    let offenders: Vec<DeviceId> = gate_result.failed_devices().cloned().collect();

    if !offenders.is_empty() {
        info!(
            workflow = %spec.label,
            offenders = offenders.len(),
            total = upstream.len(),
            "upstream devices not in gate state, remediating"
        );

        let mut remediation = Pipeline::new();
        if spec.remediation.is_empty() {
            remediation.push(Box::new(SetTask::new(
                format!("{}: {}", spec.label, spec.gate_op),
                registry.clone(),
                &offenders,
                spec.gate_op.clone(),
                spec.gate.clone(),
                spec.settings.clone(),
            )));
            remediation.push(Box::new(CheckTask::new(
                format!("{}: verify {}", spec.label, spec.gate_op),
                registry.clone(),
                &offenders,
                spec.gate_op.clone(),
                spec.gate.clone(),
                spec.settings.clone(),
            )));
        } else {
            for step in &spec.remediation {
                remediation.push(step.to_task(&spec.label, registry, &offenders, &spec.settings));
            }
        }
        remediation.run(observer).await?;

        let still = probe(
            registry,
            &offenders,
            &spec.gate_op,
            &spec.gate,
            &spec.settings,
            &gate_label,
        )
        .await?;
        if !still.all_ok() {
            let blocked: Vec<DeviceId> = still.failed_devices().cloned().collect();
            error!(
                workflow = %spec.label,
                devices = ?blocked,
                "devices still violate the gate state after remediation"
            );
            return Err(CommandError::StateConflict {
                detail: format!(
                    "{}: upstream devices failed to reach the gate state after remediation",
                    spec.label
                ),
                devices: blocked,
            });
        }
    }

    // Fan-out: only the derived set of the originally offending
    // upstreams needs action.
    let derived_all: Vec<DeviceId> = offenders
        .iter()
        .flat_map(|device| topology.derived(device))
        .collect();
    let derived = dedup_ordered(&derived_all);

    if derived.is_empty() {
        info!(workflow = %spec.label, "no derived devices need action");
        return Ok(StageResult::new());
    }

    let mut main = Pipeline::new();
    for step in &spec.main {
        main.push(step.to_task(&spec.label, registry, &derived, &spec.settings));
    }

    let recorder = Recording::new(observer);
    main.run(&recorder).await?;
    Ok(recorder.collector.last().unwrap_or_default())
}
