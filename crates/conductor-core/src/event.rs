//! Progress events, observers and cancellation.
//!
//! A running task reports a finite stream of per-item `(target, success)`
//! resolutions plus one terminal stage-completed signal. The stream is
//! delivered through a [`RunObserver`] passed to the pipeline run call:
//! a [`ChannelReporter`] forwards events to the UI layer over a broadcast
//! channel (visible mode), a [`SilentCollector`] accumulates stage results
//! into a private list for workflow decision-making (silent mode). The
//! observer choice *is* the silent/visible switch — there is no runtime
//! signal toggling.
//!
//! Cancellation is cooperative: [`CancelFlag`] is a shared atomic checked
//! by task loops between devices and between polling rounds. It never
//! aborts an in-flight device operation and never un-resolves a device.

use crate::ids::{DeviceId, TargetId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

// =============================================================================
// Stage Result
// =============================================================================

/// Aggregation of one task's per-item outcomes into two disjoint sets.
///
/// Every target of a task is resolved exactly once, so after a task
/// completes `ok.len() + failed.len()` equals the number of distinct
/// targets it operated on. Consumed by the next pipeline step or the UI;
/// never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageResult {
    pub ok: Vec<TargetId>,
    pub failed: Vec<TargetId>,
}

impl StageResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one resolved target.
    pub fn record(&mut self, target: TargetId, ok: bool) {
        if ok {
            self.ok.push(target);
        } else {
            self.failed.push(target);
        }
    }

    /// Total number of resolved targets.
    pub fn len(&self) -> usize {
        self.ok.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ok.is_empty() && self.failed.is_empty()
    }

    /// Whether every resolved target succeeded.
    pub fn all_ok(&self) -> bool {
        self.failed.is_empty()
    }

    /// Devices in the Ok set (trigger targets are skipped).
    pub fn ok_devices(&self) -> impl Iterator<Item = &DeviceId> {
        self.ok.iter().filter_map(TargetId::device)
    }

    /// Devices in the Failed set (trigger targets are skipped).
    pub fn failed_devices(&self) -> impl Iterator<Item = &DeviceId> {
        self.failed.iter().filter_map(TargetId::device)
    }
}

// =============================================================================
// Progress Events
// =============================================================================

/// One event of a pipeline's progress stream.
///
/// Per stage, the stream is a finite sequence of `ItemResolved` events —
/// ordered by completion, with timed-out items last in input order —
/// terminated by exactly one `StageCompleted`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecEvent {
    /// A set pass is about to act on this target ("current device").
    ItemStarted {
        stage: usize,
        target: TargetId,
        at: DateTime<Utc>,
    },
    /// A target reached its terminal outcome for this stage.
    ItemResolved {
        stage: usize,
        target: TargetId,
        ok: bool,
        at: DateTime<Utc>,
    },
    /// Terminal event of one stage.
    StageCompleted {
        stage: usize,
        label: String,
        ok: usize,
        failed: usize,
        at: DateTime<Utc>,
    },
}

/// Receiver of task progress.
///
/// All hooks default to no-ops so observers implement only what they
/// consume. Hooks are called from the pipeline worker; implementations
/// must not block.
pub trait RunObserver: Send + Sync {
    fn item_started(&self, _stage: usize, _target: &TargetId) {}

    fn item_resolved(&self, _stage: usize, _target: &TargetId, _ok: bool) {}

    fn stage_completed(&self, _stage: usize, _label: &str, _result: &StageResult) {}
}

/// Observer that discards everything.
#[derive(Debug, Default)]
pub struct NullObserver;

impl RunObserver for NullObserver {}

/// Visible-mode observer: forwards events to a broadcast channel.
///
/// Send errors (no subscribers) are ignored — progress reporting never
/// fails a pipeline.
pub struct ChannelReporter {
    sender: broadcast::Sender<ExecEvent>,
}

impl ChannelReporter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecEvent> {
        self.sender.subscribe()
    }

    fn emit(&self, event: ExecEvent) {
        let _ = self.sender.send(event);
    }
}

impl RunObserver for ChannelReporter {
    fn item_started(&self, stage: usize, target: &TargetId) {
        self.emit(ExecEvent::ItemStarted {
            stage,
            target: target.clone(),
            at: Utc::now(),
        });
    }

    fn item_resolved(&self, stage: usize, target: &TargetId, ok: bool) {
        self.emit(ExecEvent::ItemResolved {
            stage,
            target: target.clone(),
            ok,
            at: Utc::now(),
        });
    }

    fn stage_completed(&self, stage: usize, label: &str, result: &StageResult) {
        self.emit(ExecEvent::StageCompleted {
            stage,
            label: label.to_string(),
            ok: result.ok.len(),
            failed: result.failed.len(),
            at: Utc::now(),
        });
    }
}

/// Silent-mode observer: accumulates stage results into a private list.
///
/// Used by workflows to answer yes/no questions about current device
/// state without surfacing progress to the user.
#[derive(Debug, Default)]
pub struct SilentCollector {
    results: Mutex<Vec<StageResult>>,
}

impl SilentCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the collected stage results, in stage order.
    pub fn results(&self) -> Vec<StageResult> {
        self.results.lock().clone()
    }

    /// Result of the last completed stage, if any.
    pub fn last(&self) -> Option<StageResult> {
        self.results.lock().last().cloned()
    }
}

impl RunObserver for SilentCollector {
    fn stage_completed(&self, _stage: usize, _label: &str, result: &StageResult) {
        self.results.lock().push(result.clone());
    }
}

// =============================================================================
// Cancellation
// =============================================================================

/// Cooperative cancellation flag shared between a pipeline and its caller.
///
/// Cloning yields a handle onto the same flag. Once set, the flag stays
/// set for the lifetime of the pipeline invocation.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the remaining work.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::DeviceId;

    fn dev(name: &str) -> TargetId {
        TargetId::Device(DeviceId::new(name))
    }

    #[test]
    fn test_stage_result_partition() {
        let mut result = StageResult::new();
        result.record(dev("PS-A"), true);
        result.record(dev("PS-B"), false);
        result.record(dev("PS-C"), true);

        assert_eq!(result.len(), 3);
        assert!(!result.all_ok());
        let ok: Vec<&str> = result.ok_devices().map(DeviceId::as_str).collect();
        assert_eq!(ok, vec!["PS-A", "PS-C"]);
        let failed: Vec<&str> = result.failed_devices().map(DeviceId::as_str).collect();
        assert_eq!(failed, vec!["PS-B"]);
    }

    #[test]
    fn test_channel_reporter_forwards_events() {
        let reporter = ChannelReporter::new(16);
        let mut rx = reporter.subscribe();

        let target = dev("PS-A");
        reporter.item_resolved(0, &target, true);

        let mut result = StageResult::new();
        result.record(target, true);
        reporter.stage_completed(0, "power on", &result);

        match rx.try_recv().unwrap() {
            ExecEvent::ItemResolved { stage, ok, .. } => {
                assert_eq!(stage, 0);
                assert!(ok);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.try_recv().unwrap() {
            ExecEvent::StageCompleted {
                label, ok, failed, ..
            } => {
                assert_eq!(label, "power on");
                assert_eq!(ok, 1);
                assert_eq!(failed, 0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_channel_reporter_without_subscribers_is_silent() {
        let reporter = ChannelReporter::new(4);
        // Must not panic or error when nothing is listening.
        reporter.item_resolved(0, &dev("PS-A"), false);
    }

    #[test]
    fn test_silent_collector_accumulates_in_stage_order() {
        let collector = SilentCollector::new();

        let mut first = StageResult::new();
        first.record(dev("DCL-1"), true);
        collector.stage_completed(0, "probe", &first);

        let mut second = StageResult::new();
        second.record(dev("DCL-2"), false);
        collector.stage_completed(1, "verify", &second);

        let results = collector.results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], first);
        assert_eq!(collector.last(), Some(second));
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let handle = flag.clone();
        assert!(!flag.is_cancelled());

        handle.cancel();
        assert!(flag.is_cancelled());
    }
}
