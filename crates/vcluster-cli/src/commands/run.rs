//! Lifecycle runs on a blocking worker with an async progress ticker.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use vcluster_orchestrator::{
    ClusterOrchestrator, InMemoryAdapter, OrchestratorResult, RunMonitor, TaskOutcome, TaskSink,
};

use crate::Target;

/// Task sink that just remembers the outcome.
#[derive(Debug, Default)]
struct CliSink(Option<TaskOutcome>);

impl TaskSink for CliSink {
    fn set_finish(&mut self, outcome: TaskOutcome) {
        self.0 = Some(outcome);
    }
}

type Finished = (ClusterOrchestrator<InMemoryAdapter>, OrchestratorResult<TaskOutcome>);

pub async fn deploy(target: &Target, retries: Option<u32>, interval: u64, save: bool) -> anyhow::Result<()> {
    let (orchestrator, spec) = super::load(target, retries)?;
    let monitor = orchestrator.monitor();

    let handle = tokio::task::spawn_blocking(move || {
        let mut orchestrator = orchestrator;
        let mut sink = CliSink::default();
        let result = orchestrator.create_or_update(&spec, &mut sink);
        (orchestrator, result)
    });

    let (orchestrator, result) = watch_run(handle, &monitor, Duration::from_secs(interval.max(1))).await?;
    finish(target, orchestrator, result, save)
}

pub async fn delete(target: &Target, save: bool) -> anyhow::Result<()> {
    let (orchestrator, spec) = super::load(target, None)?;
    let monitor = orchestrator.monitor();

    let handle = tokio::task::spawn_blocking(move || {
        let mut orchestrator = orchestrator;
        let mut sink = CliSink::default();
        let result = orchestrator.delete(&spec, &mut sink);
        (orchestrator, result)
    });

    let (orchestrator, result) = watch_run(handle, &monitor, Duration::from_secs(1)).await?;
    finish(target, orchestrator, result, save)
}

/// Log progress every `every` until the run ends; Ctrl-C aborts the run.
async fn watch_run(
    mut handle: tokio::task::JoinHandle<Finished>,
    monitor: &Arc<RunMonitor>,
    every: Duration,
) -> anyhow::Result<Finished> {
    let mut ticker = tokio::time::interval(every);
    let mut aborted = false;
    loop {
        tokio::select! {
            joined = &mut handle => return Ok(joined?),
            _ = ticker.tick() => {
                let report = monitor.progress();
                info!(
                    cluster = %report.cluster,
                    phase = %report.phase,
                    progress = report.progress,
                    success = report.success,
                    failure = report.failure,
                    total = report.total,
                    "progress"
                );
            }
            _ = tokio::signal::ctrl_c(), if !aborted => {
                warn!("interrupt received, aborting at the next checkpoint");
                monitor.abort();
                aborted = true;
            }
        }
    }
}

fn finish(
    target: &Target,
    orchestrator: ClusterOrchestrator<InMemoryAdapter>,
    result: OrchestratorResult<TaskOutcome>,
    save: bool,
) -> anyhow::Result<()> {
    let report = orchestrator.monitor().progress();
    if save {
        super::save_inventory(target, orchestrator.adapter())?;
    }
    for record in orchestrator.failures().records() {
        eprintln!("✗ [{}] {}", record.action, record.message);
    }

    match result? {
        TaskOutcome::Success => {
            println!(
                "✓ Cluster {} {}: {}/{} vms",
                report.cluster, report.phase, report.success, report.total
            );
            Ok(())
        }
        TaskOutcome::Failed => anyhow::bail!(
            "cluster {} failed: {} of {} vms deployed, {} failed",
            report.cluster,
            report.success,
            report.total,
            report.failure
        ),
    }
}
