//! Cluster lifecycle phases and terminal reporting.

use serde::{Deserialize, Serialize};

/// Where a cluster run is.
///
/// `Done` and `Failed` are terminal; a run is in exactly one phase at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterPhase {
    #[default]
    Birth,
    Connect,
    FetchInfo,
    Update,
    Place,
    Deploy,
    Done,
    Failed,
}

impl ClusterPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, ClusterPhase::Done | ClusterPhase::Failed)
    }
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClusterPhase::Birth => "birth",
            ClusterPhase::Connect => "connect",
            ClusterPhase::FetchInfo => "fetch_info",
            ClusterPhase::Update => "update",
            ClusterPhase::Place => "place",
            ClusterPhase::Deploy => "deploy",
            ClusterPhase::Done => "done",
            ClusterPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Terminal result handed to the task sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Success,
    Failed,
}

impl TaskOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskOutcome::Success => "success",
            TaskOutcome::Failed => "failed",
        }
    }

    /// Terminal phase matching this outcome.
    pub fn phase(self) -> ClusterPhase {
        match self {
            TaskOutcome::Success => ClusterPhase::Done,
            TaskOutcome::Failed => ClusterPhase::Failed,
        }
    }
}

/// Receiver of a run's terminal notification.
///
/// Called exactly once per lifecycle run.
pub trait TaskSink {
    fn set_finish(&mut self, outcome: TaskOutcome);
}
