//! Cluster lifecycle state machine.
//!
//! ```text
//! Birth → Connect → FetchInfo → [Update] → Place → Deploy → Done
//!                       ↑                              │
//!                       └──── retry (fresh snapshot) ──┘      any stage → Failed
//! ```
//!
//! A run is a single sequential worker: every adapter call blocks it, and
//! planning happens in-line. Other threads observe it only through the
//! shared [`RunMonitor`].

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use vcluster_core::{
    ClusterSpec, ConfigError, DEFAULT_SYSTEM_DISK_MB, DatastorePatterns, ExistingVm, ProviderConfig,
    ResourceSnapshot, VmGroupRequest, VmName,
};
use vcluster_placement::{GroupPlacement, GroupPlacementPlanner, Inventory, PlannerConfig};

use crate::adapter::CloudAdapter;
use crate::diff::ClusterDiff;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::{NoopHook, RunEvent, RunEventHook};
use crate::failures::ErrorAggregator;
use crate::lifecycle::{ClusterPhase, TaskOutcome, TaskSink};
use crate::progress::RunMonitor;
use crate::registry::{VmBucket, VmEntry};

pub struct ClusterOrchestrator<A: CloudAdapter> {
    provider: ProviderConfig,
    patterns: DatastorePatterns,
    adapter: A,
    monitor: Arc<RunMonitor>,
    hook: Box<dyn RunEventHook>,
    failures: ErrorAggregator,
    connected: bool,
}

impl<A: CloudAdapter> ClusterOrchestrator<A> {
    pub fn new(provider: ProviderConfig, adapter: A) -> OrchestratorResult<Self> {
        let patterns = provider.patterns()?;
        Ok(Self {
            provider,
            patterns,
            adapter,
            monitor: Arc::new(RunMonitor::new()),
            hook: Box::new(NoopHook),
            failures: ErrorAggregator::new(),
            connected: false,
        })
    }

    pub fn with_event_hook(mut self, hook: impl RunEventHook + 'static) -> Self {
        self.hook = Box::new(hook);
        self
    }

    /// Handle for polling progress or aborting from another thread.
    pub fn monitor(&self) -> Arc<RunMonitor> {
        Arc::clone(&self.monitor)
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn into_adapter(self) -> A {
        self.adapter
    }

    /// Failures of the most recent run.
    pub fn failures(&self) -> &ErrorAggregator {
        &self.failures
    }

    // ── Lifecycle runs ───────────────────────────────────────────

    /// Bring the cluster to the state `spec` describes.
    ///
    /// Reports exactly one outcome to `sink`. Placement shortfalls and VMs
    /// that failed to deploy make the outcome `Failed` without making the
    /// call an error; connection loss, an unusable snapshot, an exhausted
    /// retry budget and abort are errors.
    pub fn create_or_update(
        &mut self,
        spec: &ClusterSpec,
        sink: &mut dyn TaskSink,
    ) -> OrchestratorResult<TaskOutcome> {
        self.begin_run(&spec.name);
        info!(cluster = %spec.name, "creating or updating cluster");

        let result = self.run_create(spec);
        self.end_run();

        let outcome = match &result {
            Ok(()) => self.completed_outcome(),
            Err(e) => {
                error!(cluster = %spec.name, error = %e, "cluster run failed");
                TaskOutcome::Failed
            }
        };
        self.report(sink, outcome);
        result.map(|()| outcome)
    }

    /// Destroy every VM whose name places it in `spec`'s cluster.
    ///
    /// VMs outside the naming convention are never touched. Individual
    /// destroy failures are recorded but do not fail the run.
    pub fn delete(&mut self, spec: &ClusterSpec, sink: &mut dyn TaskSink) -> OrchestratorResult<TaskOutcome> {
        self.begin_run(&spec.name);
        info!(cluster = %spec.name, "deleting cluster");

        let result = self.run_delete(spec);
        self.end_run();

        let outcome = if result.is_ok() {
            TaskOutcome::Success
        } else {
            TaskOutcome::Failed
        };
        self.report(sink, outcome);
        result.map(|()| outcome)
    }

    /// VMs of `spec`'s cluster currently on the infrastructure.
    pub fn list(&mut self, spec: &ClusterSpec) -> OrchestratorResult<Vec<VmEntry>> {
        self.begin_run(&spec.name);
        let result = self.prepare(spec).map(|snapshot| {
            self.register_existing(&snapshot, &spec.name);
        });
        self.end_run();
        result?;
        Ok(self.monitor.registry().snapshot().vms)
    }

    /// Placement `create_or_update` would start from, without deploying.
    pub fn plan(&mut self, spec: &ClusterSpec) -> OrchestratorResult<Vec<GroupPlacement>> {
        self.begin_run(&spec.name);
        let result = self.run_plan(spec);
        self.end_run();
        result
    }

    fn run_create(&mut self, spec: &ClusterSpec) -> OrchestratorResult<()> {
        let groups = self.resolve_groups(spec)?;
        let snapshot = self.prepare(spec)?;

        let existing = self.register_existing(&snapshot, &spec.name);
        self.emit(RunEvent::GroupsBuilt {
            groups: groups.iter().map(|g| g.name.clone()).collect(),
            existing: existing.len(),
        });

        if !existing.is_empty() {
            self.monitor.enter(ClusterPhase::Update);
            let diff = ClusterDiff::compute(&spec.name, &groups, &existing);
            for vm in &diff.surplus {
                warn!(cluster = %spec.name, %vm, "vm is no longer desired, leaving it in place");
            }
            let no_difference = diff.is_empty();
            info!(
                cluster = %spec.name,
                missing = diff.missing_count(),
                surplus = diff.surplus.len(),
                "cluster diff computed"
            );
            self.emit(RunEvent::DiffComputed(diff));
            if no_difference {
                info!(cluster = %spec.name, "no difference, nothing to deploy");
                self.monitor.registry().move_all(VmBucket::Existing, VmBucket::Finished);
                return Ok(());
            }
        }

        self.deploy_with_retries(spec, &groups, snapshot)
    }

    fn run_delete(&mut self, spec: &ClusterSpec) -> OrchestratorResult<()> {
        let snapshot = self.prepare(spec)?;
        let owned = owned_vms(&snapshot, &spec.name);
        for (_, vm) in &owned {
            self.monitor.registry().insert(&vm.name, VmBucket::Existing);
        }

        let mut destroyed = 0;
        for (_, vm) in owned {
            self.checkpoint()?;
            info!(cluster = %spec.name, vm = %vm.name, host = %vm.host, "destroying vm");
            match self.adapter.destroy(vm) {
                Ok(()) => {
                    self.monitor.registry().move_vm(&vm.name, VmBucket::Existing, VmBucket::Finished);
                    destroyed += 1;
                }
                Err(e) => {
                    self.monitor.registry().move_vm(&vm.name, VmBucket::Existing, VmBucket::Failed);
                    self.failures.record("destroy", e.to_string());
                }
            }
        }
        info!(cluster = %spec.name, destroyed, "cluster deleted");
        Ok(())
    }

    fn run_plan(&mut self, spec: &ClusterSpec) -> OrchestratorResult<Vec<GroupPlacement>> {
        let groups = self.resolve_groups(spec)?;
        let snapshot = self.prepare(spec)?;
        self.register_existing(&snapshot, &spec.name);
        self.monitor.enter(ClusterPhase::Place);
        self.place(spec, &groups, &snapshot)
    }

    // ── Stages ───────────────────────────────────────────────────

    /// Validate `spec` and resolve its groups against the provider.
    fn resolve_groups(&mut self, spec: &ClusterSpec) -> OrchestratorResult<Vec<VmGroupRequest>> {
        spec.validate()
            .and_then(|()| spec.group_requests(&self.provider))
            .map_err(|e: ConfigError| {
                self.failures.record("validate", e.to_string());
                OrchestratorError::InvalidSpec(e)
            })
    }

    /// Connect and fetch the first snapshot.
    fn prepare(&mut self, spec: &ClusterSpec) -> OrchestratorResult<ResourceSnapshot> {
        self.connect()?;
        self.fetch(spec, 0)
    }

    fn connect(&mut self) -> OrchestratorResult<()> {
        self.monitor.enter(ClusterPhase::Connect);
        debug!(address = %self.provider.address, user = %self.provider.user, "connecting");
        if let Err(e) = self
            .adapter
            .login(&self.provider.address, &self.provider.user, &self.provider.password)
        {
            self.failures.record("connect", e.to_string());
            return Err(OrchestratorError::Connection(e));
        }
        self.connected = true;
        Ok(())
    }

    fn fetch(&mut self, spec: &ClusterSpec, attempt: u32) -> OrchestratorResult<ResourceSnapshot> {
        self.monitor.enter(ClusterPhase::FetchInfo);
        let snapshot = match self
            .adapter
            .fetch_datacenter(&self.provider.datacenter, &spec.template_id)
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.failures.record("fetch", e.to_string());
                return Err(OrchestratorError::Fetch(e));
            }
        };
        let vms = snapshot.vms().count();
        info!(
            datacenter = %snapshot.datacenter,
            clusters = snapshot.clusters.len(),
            vms,
            attempt,
            "resources fetched"
        );
        self.emit(RunEvent::SnapshotFetched {
            attempt,
            clusters: snapshot.clusters.len(),
            vms,
        });
        Ok(snapshot)
    }

    /// Place and deploy, refreshing the snapshot before every retry.
    ///
    /// Only the shortfalls of the last attempt are recorded, so retries do
    /// not count the same missing instance twice.
    fn deploy_with_retries(
        &mut self,
        spec: &ClusterSpec,
        groups: &[VmGroupRequest],
        first: ResourceSnapshot,
    ) -> OrchestratorResult<()> {
        let retries = self.provider.deploy_retries;
        let mut snapshot = Some(first);
        let mut attempt = 0;

        loop {
            self.checkpoint()?;
            let mut planned = Vec::new();
            let result = self.attempt(spec, groups, snapshot.take(), attempt, &mut planned);

            let last = matches!(result, Ok(())) || attempt >= retries;
            if last || matches!(result, Err(OrchestratorError::Aborted)) {
                for group in &planned {
                    if let Some(shortfall) = &group.shortfall {
                        self.failures.record_shortfall(shortfall.unplaced, shortfall.message.clone());
                    }
                }
            }

            match result {
                Ok(()) => {
                    let promoted = self
                        .monitor
                        .registry()
                        .move_all(VmBucket::Existing, VmBucket::Finished);
                    info!(cluster = %spec.name, attempt, promoted, "cluster deployed");
                    return Ok(());
                }
                Err(OrchestratorError::Aborted) => return Err(OrchestratorError::Aborted),
                Err(e) if attempt >= retries => return Err(e),
                Err(e) => {
                    warn!(cluster = %spec.name, attempt, error = %e, "deploy attempt failed, retrying");
                    attempt += 1;
                }
            }
        }
    }

    /// One deploy attempt; retries start from a fresh snapshot.
    fn attempt(
        &mut self,
        spec: &ClusterSpec,
        groups: &[VmGroupRequest],
        snapshot: Option<ResourceSnapshot>,
        attempt: u32,
        planned: &mut Vec<GroupPlacement>,
    ) -> OrchestratorResult<()> {
        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => {
                let snapshot = self.fetch(spec, attempt)?;
                self.register_existing(&snapshot, &spec.name);
                snapshot
            }
        };

        self.monitor.enter(ClusterPhase::Place);
        *planned = self.place(spec, groups, &snapshot)?;

        self.monitor.enter(ClusterPhase::Deploy);
        self.deploy(planned, attempt)
    }

    /// Plan every group against one inventory; placed VMs enter `Preparing`.
    fn place(
        &mut self,
        spec: &ClusterSpec,
        groups: &[VmGroupRequest],
        snapshot: &ResourceSnapshot,
    ) -> OrchestratorResult<Vec<GroupPlacement>> {
        let owned = owned_vms(snapshot, &spec.name);
        let config = PlannerConfig {
            system_disk_mb: snapshot.system_disk_mb().unwrap_or(DEFAULT_SYSTEM_DISK_MB),
            seed: self.provider.placement_seed,
            ..PlannerConfig::default()
        };
        let inventory = Inventory::build(snapshot, &self.patterns);
        let mut planner = GroupPlacementPlanner::new(
            &spec.name,
            inventory,
            owned.iter().map(|(_, vm)| vm.name.clone()),
            config,
        );

        let mut placements = Vec::with_capacity(groups.len());
        for group in groups {
            self.checkpoint()?;
            let mut group = group.clone();
            if let Some(network) = group.network.as_mut() {
                for (name, vm) in &owned {
                    if name.group == group.name {
                        if let Some(ip) = vm.ip_address {
                            network.remove(ip);
                        }
                    }
                }
            }

            let placement = planner.plan(&mut group);
            for vm in &placement.vms {
                self.monitor.registry().insert(&vm.name, VmBucket::Preparing);
            }
            self.emit(RunEvent::GroupPlanned(placement.clone()));
            placements.push(placement);
        }
        Ok(placements)
    }

    /// Provision every placed VM; fails if any VM failed.
    fn deploy(&mut self, placements: &mut [GroupPlacement], attempt: u32) -> OrchestratorResult<()> {
        let total: usize = placements.iter().map(|g| g.vms.len()).sum();
        info!(attempt, vms = total, "deploying");
        self.emit(RunEvent::DeployAttempt { attempt, vms: total });

        let mut failed = 0;
        let mut last_error = None;
        for group in placements.iter_mut() {
            self.checkpoint()?;
            for vm in &mut group.vms {
                let registry = self.monitor.registry();
                registry.move_vm(&vm.name, VmBucket::Preparing, VmBucket::Deploying);
                match self.adapter.provision(vm) {
                    Ok(()) => {
                        registry.move_vm(&vm.name, VmBucket::Deploying, VmBucket::Finished);
                    }
                    Err(e) => {
                        registry.move_vm(&vm.name, VmBucket::Deploying, VmBucket::Failed);
                        let message = e.to_string();
                        self.failures.record_deploy_failure(message.clone());
                        vm.error = Some(message.clone());
                        last_error = Some(message);
                        failed += 1;
                    }
                }
            }
        }

        match last_error {
            None => Ok(()),
            Some(last) => Err(OrchestratorError::Deploy { failed, last }),
        }
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn begin_run(&mut self, cluster: &str) {
        self.monitor.begin(cluster);
        self.failures = ErrorAggregator::new();
    }

    /// Track the cluster's VMs found in `snapshot` as existing.
    ///
    /// On a retry the snapshot also holds VMs deployed by earlier attempts;
    /// those stay finished.
    fn register_existing(&mut self, snapshot: &ResourceSnapshot, cluster: &str) -> Vec<VmName> {
        let owned = owned_vms(snapshot, cluster);
        for (_, vm) in &owned {
            self.monitor.registry().observe_existing(&vm.name);
        }
        debug!(%cluster, existing = owned.len(), "existing vms registered");
        owned.into_iter().map(|(name, _)| name).collect()
    }

    /// Fail with `Aborted` once an abort was requested.
    fn checkpoint(&mut self) -> OrchestratorResult<()> {
        if self.monitor.is_aborted() {
            self.failures.record("abort", "run aborted");
            return Err(OrchestratorError::Aborted);
        }
        Ok(())
    }

    /// Success needs a clean deploy: nothing left unplaced or failed.
    fn completed_outcome(&self) -> TaskOutcome {
        let failed = self.monitor.registry().snapshot().failed;
        if self.failures.placement_failed() == 0 && failed == 0 {
            TaskOutcome::Success
        } else {
            TaskOutcome::Failed
        }
    }

    fn report(&mut self, sink: &mut dyn TaskSink, outcome: TaskOutcome) {
        self.monitor.finish(outcome);
        self.emit(RunEvent::Finished { outcome });
        info!(outcome = outcome.as_str(), failures = self.failures.records().len(), "run finished");
        sink.set_finish(outcome);
    }

    /// Log out, report failures and drop a consumed abort request.
    fn end_run(&mut self) {
        self.release_connection();
        self.monitor.clear_abort();
    }

    fn release_connection(&mut self) {
        if self.connected {
            self.adapter.logout();
            self.connected = false;
        }
        if !self.failures.is_empty() {
            debug!(post_mortem = %self.failures.post_mortem(), "run failures");
        }
    }

    fn emit(&mut self, event: RunEvent) {
        self.hook.on_event(&event);
    }
}

/// VMs in `snapshot` whose names place them in `cluster`.
fn owned_vms<'a>(snapshot: &'a ResourceSnapshot, cluster: &str) -> Vec<(VmName, &'a ExistingVm)> {
    snapshot
        .vms()
        .filter_map(|vm| VmName::parse(&vm.name).map(|name| (name, vm)))
        .filter(|(name, _)| name.belongs_to(cluster))
        .collect()
}
