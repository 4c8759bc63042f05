//! vcluster orchestrator — drives a VM cluster through its lifecycle.
//!
//! A run connects to the virtualization layer through a [`CloudAdapter`],
//! fetches a resource snapshot, compares the desired groups with the VMs
//! already there, plans the missing instances and provisions them with a
//! bounded number of retries. Progress can be polled from other threads
//! through a shared [`RunMonitor`] while the run is in flight.
//!
//! # Components
//!
//! - **`adapter`** — The cloud adapter interface
//! - **`memory_adapter`** — In-memory adapter backed by a JSON inventory
//! - **`registry`** — VM lifecycle buckets behind one lock
//! - **`failures`** — Ordered failure record and counters
//! - **`diff`** — Desired vs. existing comparison
//! - **`events`** — Structured run-event hook
//! - **`lifecycle`** — Cluster phases, outcomes and the task sink
//! - **`progress`** — Poll-safe run monitor and progress report
//! - **`orchestrator`** — The cluster lifecycle state machine

pub mod adapter;
pub mod diff;
pub mod error;
pub mod events;
pub mod failures;
pub mod lifecycle;
pub mod memory_adapter;
pub mod orchestrator;
pub mod progress;
pub mod registry;

pub use adapter::CloudAdapter;
pub use diff::{ClusterDiff, GroupChange};
pub use error::{AdapterError, AdapterResult, OrchestratorError, OrchestratorResult};
pub use events::{NoopHook, RunEvent, RunEventHook};
pub use failures::{ErrorAggregator, FailureRecord};
pub use lifecycle::{ClusterPhase, TaskOutcome, TaskSink};
pub use memory_adapter::InMemoryAdapter;
pub use orchestrator::ClusterOrchestrator;
pub use progress::{ProgressReport, RunMonitor, progress_percent};
pub use registry::{RegistrySnapshot, VmBucket, VmEntry, VmRegistry};
