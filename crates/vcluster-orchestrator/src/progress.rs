//! Poll-safe view of a run in flight.
//!
//! A [`RunMonitor`] is shared (`Arc`) between the orchestrator and any
//! number of pollers. It owns the run's [`VmRegistry`], its phase and the
//! abort flag; [`RunMonitor::progress`] takes one consistent reading.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::lifecycle::{ClusterPhase, TaskOutcome};
use crate::registry::{VmEntry, VmRegistry};

/// `floor(done * 100 / total)`, or 0 for an empty run.
pub fn progress_percent(done: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (done * 100 / total) as u32
}

/// Counts and listing reported to progress pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub cluster: String,
    pub phase: ClusterPhase,
    pub finished: bool,
    pub outcome: Option<TaskOutcome>,
    /// Planned, not yet deploying.
    pub waiting: usize,
    pub deploying: usize,
    /// Already on the infrastructure, not yet confirmed by this run.
    pub waiting_start: usize,
    pub success: usize,
    pub failure: usize,
    pub running: usize,
    pub total: usize,
    pub succeeded: bool,
    /// Percentage of tracked VMs that reached a final bucket.
    pub progress: u32,
    pub vms: Vec<VmEntry>,
}

#[derive(Debug, Default)]
struct RunState {
    cluster: String,
    phase: ClusterPhase,
    outcome: Option<TaskOutcome>,
}

#[derive(Debug, Default)]
pub struct RunMonitor {
    state: Mutex<RunState>,
    registry: VmRegistry,
    abort: AtomicBool,
}

impl RunMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn registry(&self) -> &VmRegistry {
        &self.registry
    }

    /// Start tracking a new run of `cluster`. The abort flag is kept.
    pub(crate) fn begin(&self, cluster: &str) {
        let mut state = self.state();
        state.cluster = cluster.to_string();
        state.phase = ClusterPhase::Birth;
        state.outcome = None;
        self.registry.clear();
    }

    pub(crate) fn enter(&self, phase: ClusterPhase) {
        let mut state = self.state();
        debug!(cluster = %state.cluster, from = %state.phase, to = %phase, "phase change");
        state.phase = phase;
    }

    pub(crate) fn finish(&self, outcome: TaskOutcome) {
        let mut state = self.state();
        state.phase = outcome.phase();
        state.outcome = Some(outcome);
    }

    pub fn phase(&self) -> ClusterPhase {
        self.state().phase
    }

    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.state().outcome
    }

    /// Ask the run to stop at its next checkpoint.
    ///
    /// A request made between runs applies to the next one. It is dropped
    /// once the run it applied to ends.
    pub fn abort(&self) {
        warn!("abort requested");
        self.abort.store(true, Ordering::SeqCst);
    }

    pub(crate) fn clear_abort(&self) {
        self.abort.store(false, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> ProgressReport {
        let (cluster, phase, outcome) = {
            let state = self.state();
            (state.cluster.clone(), state.phase, state.outcome)
        };
        let snap = self.registry.snapshot();
        ProgressReport {
            cluster,
            phase,
            finished: phase.is_terminal(),
            outcome,
            waiting: snap.preparing,
            deploying: snap.deploying,
            waiting_start: snap.existing,
            success: snap.finished,
            failure: snap.failed,
            running: snap.running,
            total: snap.total,
            succeeded: outcome == Some(TaskOutcome::Success) && snap.failed == 0,
            progress: progress_percent(snap.finished + snap.failed, snap.total),
            vms: snap.vms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::VmBucket;

    #[test]
    fn percent_is_floored_and_zero_for_empty() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 66);
        assert_eq!(progress_percent(3, 3), 100);
    }

    #[test]
    fn report_maps_buckets() {
        let monitor = RunMonitor::new();
        monitor.begin("hadoop1");
        monitor.enter(ClusterPhase::Deploy);
        let registry = monitor.registry();
        registry.insert("hadoop1-worker-0", VmBucket::Preparing);
        registry.insert("hadoop1-worker-1", VmBucket::Deploying);
        registry.insert("hadoop1-worker-2", VmBucket::Finished);
        registry.insert("hadoop1-master-0", VmBucket::Existing);

        let report = monitor.progress();
        assert_eq!(report.phase, ClusterPhase::Deploy);
        assert!(!report.finished);
        assert_eq!((report.waiting, report.deploying, report.waiting_start), (1, 1, 1));
        assert_eq!(report.success, 1);
        assert_eq!(report.running, 3);
        assert_eq!(report.total, 4);
        assert_eq!(report.progress, 25);
        assert!(!report.succeeded);

        monitor.finish(TaskOutcome::Success);
        let report = monitor.progress();
        assert_eq!(report.phase, ClusterPhase::Done);
        assert!(report.finished);
        assert!(report.succeeded);
    }

    #[test]
    fn begin_resets_run_but_not_abort() {
        let monitor = RunMonitor::new();
        monitor.begin("a");
        monitor.registry().insert("a-g-0", VmBucket::Failed);
        monitor.finish(TaskOutcome::Failed);
        monitor.abort();

        monitor.begin("b");
        let report = monitor.progress();
        assert_eq!(report.cluster, "b");
        assert_eq!(report.phase, ClusterPhase::Birth);
        assert_eq!(report.outcome, None);
        assert_eq!(report.total, 0);
        assert!(monitor.is_aborted());

        monitor.clear_abort();
        assert!(!monitor.is_aborted());
    }
}
