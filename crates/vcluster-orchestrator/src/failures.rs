//! Failure record of a cluster run.
//!
//! Entries are appended in the order failures happen and never removed.
//! The counters decide the run's outcome; the entries make up the
//! post-mortem logged when the connection is released.

use std::fmt::Write;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// What the run was doing: `connect`, `fetch`, `placement`, `deploy`, ...
    pub action: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ErrorAggregator {
    records: Vec<FailureRecord>,
    placement_failed: u32,
    deploy_failed: u32,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, action: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(%action, %message, "failure recorded");
        self.records.push(FailureRecord {
            action: action.to_string(),
            message,
        });
    }

    /// A group ended the pass with `unplaced` instances missing.
    pub fn record_shortfall(&mut self, unplaced: u32, message: impl Into<String>) {
        self.placement_failed += unplaced;
        self.record("placement", message);
    }

    pub fn record_deploy_failure(&mut self, message: impl Into<String>) {
        self.deploy_failed += 1;
        self.record("deploy", message);
    }

    /// Desired instances no group could place.
    pub fn placement_failed(&self) -> u32 {
        self.placement_failed
    }

    pub fn deploy_failed(&self) -> u32 {
        self.deploy_failed
    }

    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.message.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Human-readable summary of everything that went wrong.
    pub fn post_mortem(&self) -> String {
        let mut out = format!(
            "{} failure(s), placement failed: {}, deploy failed: {}\n",
            self.records.len(),
            self.placement_failed,
            self.deploy_failed
        );
        for (i, record) in self.records.iter().enumerate() {
            let _ = writeln!(out, "  {:>3}. [{}] {}", i + 1, record.action, record.message);
        }
        out
    }
}
