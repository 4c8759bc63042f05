//! Structured run events.
//!
//! The orchestrator reports the intermediate objects of a run (snapshot
//! summary, groups, diff, per-group placement) to a [`RunEventHook`].
//! Production runs use [`NoopHook`]; tests install a recording hook.

use serde::Serialize;

use vcluster_placement::GroupPlacement;

use crate::diff::ClusterDiff;
use crate::lifecycle::TaskOutcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    SnapshotFetched {
        attempt: u32,
        clusters: usize,
        vms: usize,
    },
    GroupsBuilt {
        groups: Vec<String>,
        existing: usize,
    },
    DiffComputed(ClusterDiff),
    GroupPlanned(GroupPlacement),
    DeployAttempt {
        attempt: u32,
        vms: usize,
    },
    Finished {
        outcome: TaskOutcome,
    },
}

pub trait RunEventHook: Send {
    fn on_event(&mut self, event: &RunEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl RunEventHook for NoopHook {
    fn on_event(&mut self, _event: &RunEvent) {}
}
