//! Group placement planner.
//!
//! For every instance of a group the planner walks, in order:
//! 1. Candidate resource pools, least used first, sticking to a pool until
//!    it runs out of memory or hosts
//! 2. The pool's cluster hosts in round-robin order
//! 3. A system datastore from the host's shared datastores
//! 4. Data datastores of the requested disk type, striping the disk across
//!    several datastores only when no single one can hold it
//!
//! Reservations are speculative: they live on the [`Inventory`] for the
//! rest of the pass and are never written back to the infrastructure.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use vcluster_core::{
    DEFAULT_SYSTEM_DISK_MB, DiskType, RESERVED_REMAINDER_MB, ResourcePoolRef, ResourceRequirement,
    VmGroupRequest, vm_name,
};

use crate::inventory::{DatastoreId, HostId, Inventory, PoolId};
use crate::rotation::{Rotation, Verdict};

/// Tunables of a planning pass.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Space every datastore keeps free after reservations.
    pub reserved_remainder_mb: u64,
    /// Space reserved on the system datastore for each VM's boot disk.
    pub system_disk_mb: u64,
    /// Seed for host and datastore shuffling; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            reserved_remainder_mb: RESERVED_REMAINDER_MB,
            system_disk_mb: DEFAULT_SYSTEM_DISK_MB,
            seed: None,
        }
    }
}

/// One data disk of a placed VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskPlacement {
    pub size_mb: u64,
    pub datastore: String,
    /// `[<datastore>] <vm>/data.vmdk`
    pub path: String,
}

/// Where one VM goes and what it is made of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmPlacement {
    pub name: String,
    pub cluster: String,
    pub group: String,
    pub index: u32,
    pub host: String,
    pub host_handle: String,
    pub resource_pool: ResourcePoolRef,
    pub system_datastore: String,
    pub template_id: String,
    pub memory_mb: u64,
    pub disks: Vec<DiskPlacement>,
    pub network: Option<String>,
    pub ip_address: Option<Ipv4Addr>,
    /// Last deploy failure for this VM, filled in by the deployer.
    pub error: Option<String>,
}

/// Instances of a group that could not be placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shortfall {
    pub message: String,
    pub unplaced: u32,
}

/// Result of planning one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupPlacement {
    pub group: String,
    pub desired: u32,
    /// Instances skipped because a VM with their name already exists.
    pub existing: u32,
    pub vms: Vec<VmPlacement>,
    pub shortfall: Option<Shortfall>,
}

impl GroupPlacement {
    pub fn placed(&self) -> u32 {
        self.vms.len() as u32
    }
}

/// Host-level choice made before any reservation is committed.
struct HostChoice {
    system: DatastoreId,
    data: Vec<(DatastoreId, u64)>,
}

/// Plans groups one after another against a single inventory.
pub struct GroupPlacementPlanner {
    cluster_name: String,
    inventory: Inventory,
    existing: HashSet<String>,
    config: PlannerConfig,
    rng: StdRng,
}

impl GroupPlacementPlanner {
    /// Create a planner for `cluster_name`.
    ///
    /// `existing` holds the names of VMs already present; their instances
    /// are skipped rather than placed again.
    pub fn new(
        cluster_name: &str,
        inventory: Inventory,
        existing: impl IntoIterator<Item = String>,
        config: PlannerConfig,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            cluster_name: cluster_name.to_string(),
            inventory,
            existing: existing.into_iter().collect(),
            config,
            rng,
        }
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn into_inventory(self) -> Inventory {
        self.inventory
    }

    /// Place every missing instance of `group`.
    ///
    /// Stops at the first instance that cannot be placed anywhere and
    /// reports the rest of the group as a shortfall. Addresses are drawn
    /// from the group's network pool as VMs are placed.
    pub fn plan(&mut self, group: &mut VmGroupRequest) -> GroupPlacement {
        let mut result = GroupPlacement {
            group: group.name.clone(),
            desired: group.instances,
            existing: 0,
            vms: Vec::new(),
            shortfall: None,
        };

        let mut pools = Rotation::new(self.ordered_pools(group));
        let mut host_rotations: HashMap<PoolId, Rotation<HostId>> = HashMap::new();
        let mut last_failure: Option<String> = None;

        for index in 0..group.instances {
            let name = vm_name(&self.cluster_name, &group.name, index);
            if self.existing.contains(&name) {
                debug!(vm = %name, "vm already exists, leaving its settings unchanged");
                result.existing += 1;
                continue;
            }

            let exhausted = group.network.as_ref().filter(|net| net.available() == 0);
            if let Some(net) = exhausted {
                last_failure = Some(format!("network {} has no free address", net.network()));
                result.shortfall = Some(self.shortfall(group, index, &name, last_failure.as_deref()));
                break;
            }

            let Some((pool, host, choice)) = self.find_slot(
                &name,
                &group.requirement,
                &mut pools,
                &mut host_rotations,
                &mut last_failure,
            ) else {
                result.shortfall = Some(self.shortfall(group, index, &name, last_failure.as_deref()));
                break;
            };

            let ip_address = group.network.as_mut().and_then(|net| net.allocate());
            let vm = self.commit(&name, group, index, pool, host, choice, ip_address);
            debug!(
                vm = %vm.name,
                host = %vm.host,
                pool = %vm.resource_pool,
                disks = vm.disks.len(),
                "vm placed"
            );
            result.vms.push(vm);
        }

        info!(
            group = %result.group,
            desired = result.desired,
            existing = result.existing,
            placed = result.placed(),
            "group planned"
        );
        result
    }

    /// Candidate pools of the group, least used first.
    fn ordered_pools(&self, group: &VmGroupRequest) -> Vec<PoolId> {
        let mut ids: Vec<PoolId> = Vec::with_capacity(group.resource_pools.len());
        for rp in &group.resource_pools {
            match self.inventory.pool_id(rp) {
                Some(id) if !ids.contains(&id) => ids.push(id),
                Some(_) => {}
                None => warn!(group = %group.name, pool = %rp, "resource pool not found in snapshot"),
            }
        }
        // Stable: ties keep the user's order.
        ids.sort_by_key(|&id| self.inventory.pools[id].used_counter);
        ids
    }

    /// Find a pool, host and datastores for one VM.
    fn find_slot(
        &mut self,
        name: &str,
        req: &ResourceRequirement,
        pools: &mut Rotation<PoolId>,
        host_rotations: &mut HashMap<PoolId, Rotation<HostId>>,
        last_failure: &mut Option<String>,
    ) -> Option<(PoolId, HostId, HostChoice)> {
        loop {
            let pool = *pools.current()?;
            let state = &self.inventory.pools[pool];
            if !state.can_fit(req.memory_mb) {
                *last_failure = Some(format!(
                    "resource pool {} has {} MiB free, {name} needs {} MiB",
                    state.pool,
                    state.real_free_memory_mb(),
                    req.memory_mb
                ));
                debug!(pool = %state.pool, "resource pool out of memory, trying next");
                pools.evict_current();
                continue;
            }

            let cluster = state.cluster;
            let hosts = host_rotations
                .entry(pool)
                .or_insert_with(|| Rotation::new(self.inventory.host_order(cluster, &mut self.rng)));

            let chosen = hosts.cycle(|&host| match self.try_host(host, name, req) {
                Ok(choice) => Verdict::Take(choice),
                Err(reason) => {
                    debug!(%reason, "host rejected");
                    *last_failure = Some(reason);
                    Verdict::Evict
                }
            });

            match chosen {
                Some((host, choice)) => {
                    // Next VM starts from the following host.
                    hosts.advance();
                    return Some((pool, host, choice));
                }
                None => {
                    debug!(pool = %self.inventory.pools[pool].pool, "no host left in resource pool, trying next");
                    pools.evict_current();
                }
            }
        }
    }

    /// Check one host and pick its datastores.
    ///
    /// The system disk is reserved up front so data-disk selection on the
    /// same datastores sees it; it is released again if the host fails.
    fn try_host(&mut self, host: HostId, name: &str, req: &ResourceRequirement) -> Result<HostChoice, String> {
        let state = &self.inventory.hosts[host];
        if state.real_free_memory_mb() < req.memory_mb {
            return Err(format!(
                "host {} hasn't enough memory for {name}: requested {} MiB, host has {} MiB",
                state.name,
                req.memory_mb,
                state.real_free_memory_mb()
            ));
        }

        self.inventory.prepare_datastores(host, &mut self.rng);

        let Some(system) = self.select_system_datastore(host) else {
            return Err(format!(
                "no suitable system datastore on host {}",
                self.inventory.hosts[host].name
            ));
        };
        self.inventory.datastores[system].unaccounted_mb += self.config.system_disk_mb;

        match self.select_data_datastores(host, req.disk_type, req.disk_size_mb) {
            Some(data) => Ok(HostChoice { system, data }),
            None => {
                self.inventory.datastores[system].unaccounted_mb -= self.config.system_disk_mb;
                Err(format!(
                    "not enough {} disk on host {} for {name}: requested {} MiB",
                    disk_type_label(req.disk_type),
                    self.inventory.hosts[host].name,
                    req.disk_size_mb
                ))
            }
        }
    }

    fn select_system_datastore(&mut self, host: HostId) -> Option<DatastoreId> {
        let threshold = self.config.reserved_remainder_mb;
        let Inventory { hosts, datastores, .. } = &mut self.inventory;
        let candidates = &mut hosts[host].candidates.as_mut()?.shared;

        candidates.retain(|&ds| datastores[ds].real_free_space_mb() >= threshold);
        candidates
            .lap()
            .copied()
            .find(|&ds| datastores[ds].real_free_space_mb() > threshold)
    }

    /// Datastores covering `size_mb`, with the amount taken from each.
    fn select_data_datastores(
        &mut self,
        host: HostId,
        disk_type: DiskType,
        size_mb: u64,
    ) -> Option<Vec<(DatastoreId, u64)>> {
        let threshold = self.config.reserved_remainder_mb;
        let Inventory { hosts, datastores, .. } = &mut self.inventory;
        let candidates = hosts[host].candidates.as_mut()?;
        let candidates = match disk_type {
            DiskType::Shared => &mut candidates.shared,
            DiskType::Local => &mut candidates.local,
        };

        candidates.retain(|&ds| datastores[ds].real_free_space_mb() >= threshold);
        // A zero-size request still gets one disk, on the next candidate.
        if size_mb == 0 {
            return candidates.current().map(|&ds| vec![(ds, 0)]);
        }

        let usable = |ds: DatastoreId| datastores[ds].real_free_space_mb().saturating_sub(threshold);

        if let Some(ds) = candidates.lap().copied().find(|&ds| usable(ds) >= size_mb) {
            return Some(vec![(ds, size_mb)]);
        }

        // Stripe across the rotation.
        let mut remaining = size_mb;
        let mut used = Vec::new();
        for &ds in candidates.lap() {
            let take = usable(ds).min(remaining);
            if take == 0 {
                continue;
            }
            used.push((ds, take));
            remaining -= take;
            if remaining == 0 {
                return Some(used);
            }
        }
        None
    }

    /// Reserve everything the choice needs and build the placement.
    #[allow(clippy::too_many_arguments)]
    fn commit(
        &mut self,
        name: &str,
        group: &VmGroupRequest,
        index: u32,
        pool: PoolId,
        host: HostId,
        choice: HostChoice,
        ip_address: Option<Ipv4Addr>,
    ) -> VmPlacement {
        let memory_mb = group.requirement.memory_mb;
        let inv = &mut self.inventory;

        let pool_state = &mut inv.pools[pool];
        pool_state.unaccounted_mb += memory_mb;
        pool_state.used_counter += 1;
        let resource_pool = pool_state.pool.clone();

        let host_state = &mut inv.hosts[host];
        host_state.unaccounted_mb += memory_mb;

        let mut disks = Vec::with_capacity(choice.data.len());
        for &(ds, size_mb) in &choice.data {
            let datastore = &mut inv.datastores[ds];
            datastore.unaccounted_mb += size_mb;
            disks.push(DiskPlacement {
                size_mb,
                datastore: datastore.name.clone(),
                path: format!("[{}] {name}/data.vmdk", datastore.name),
            });
        }

        if let Some(candidates) = inv.hosts[host].candidates.as_mut() {
            candidates.shared.advance_past(&choice.system);
            let data = match group.requirement.disk_type {
                DiskType::Shared => &mut candidates.shared,
                DiskType::Local => &mut candidates.local,
            };
            if let Some(&(last, _)) = choice.data.last() {
                data.advance_past(&last);
            }
        }

        let host_state = &inv.hosts[host];
        VmPlacement {
            name: name.to_string(),
            cluster: self.cluster_name.clone(),
            group: group.name.clone(),
            index,
            host: host_state.name.clone(),
            host_handle: host_state.handle.clone(),
            resource_pool,
            system_datastore: inv.datastores[choice.system].name.clone(),
            template_id: group.requirement.template_id.clone(),
            memory_mb,
            disks,
            network: group.network.as_ref().map(|n| n.network().to_string()),
            ip_address,
            error: None,
        }
    }

    fn shortfall(&self, group: &VmGroupRequest, index: u32, name: &str, reason: Option<&str>) -> Shortfall {
        let unplaced = (index..group.instances)
            .filter(|&i| !self.existing.contains(&vm_name(&self.cluster_name, &group.name, i)))
            .count() as u32;
        let reason = reason.unwrap_or("no usable resource pool for the group");
        let message = format!(
            "vm {name} can not get resources: {reason}. \
             Group {} has no resources for the remaining {unplaced} vm(s)",
            group.name
        );
        warn!(group = %group.name, unplaced, %message, "placement shortfall");
        Shortfall { message, unplaced }
    }
}

fn disk_type_label(disk_type: DiskType) -> &'static str {
    match disk_type {
        DiskType::Shared => "shared",
        DiskType::Local => "local",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcluster_core::{
        ClusterInventory, DatastoreInfo, DatastorePatterns, HostInfo, IpPool, NetworkSpec,
        ResourcePoolInfo, ResourceSnapshot,
    };

    const GB: u64 = 1024;
    const R: u64 = RESERVED_REMAINDER_MB;

    fn patterns() -> DatastorePatterns {
        DatastorePatterns::new(&["san*".to_string()], &["local*".to_string()]).unwrap()
    }

    fn host(name: &str, memory_mb: u64, datastores: &[&str]) -> HostInfo {
        HostInfo {
            name: name.to_string(),
            handle: format!("handle-{name}"),
            free_memory_mb: memory_mb,
            datastores: datastores.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn ds(name: &str, free_mb: u64) -> DatastoreInfo {
        DatastoreInfo {
            name: name.to_string(),
            free_space_mb: free_mb,
        }
    }

    fn pool(name: &str, free_mb: u64) -> ResourcePoolInfo {
        ResourcePoolInfo {
            name: name.to_string(),
            limit_mb: Some(free_mb),
            free_memory_mb: free_mb,
        }
    }

    /// One cluster `c1`, one shared `san` datastore for system disks.
    fn single_host_snapshot(pool_free_mb: u64, local_free_mb: &[u64]) -> ResourceSnapshot {
        let mut datastores = vec![ds("san", 200 * GB)];
        let mut names = vec!["san".to_string()];
        for (i, free) in local_free_mb.iter().enumerate() {
            let n = format!("local{i}");
            datastores.push(ds(&n, *free));
            names.push(n);
        }
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        ResourceSnapshot {
            datacenter: "dc".to_string(),
            clusters: vec![ClusterInventory {
                name: "c1".to_string(),
                resource_pools: vec![pool("rp1", pool_free_mb)],
                hosts: vec![host("h1", 64 * GB, &names)],
                datastores,
                vms: Vec::new(),
            }],
            template: None,
        }
    }

    fn group(name: &str, instances: u32, memory_mb: u64, disk_mb: u64, disk_type: DiskType) -> VmGroupRequest {
        VmGroupRequest {
            name: name.to_string(),
            instances,
            requirement: ResourceRequirement {
                memory_mb,
                disk_size_mb: disk_mb,
                disk_type,
                template_id: "tmpl".to_string(),
            },
            resource_pools: vec![ResourcePoolRef::new("c1", "rp1")],
            network: None,
        }
    }

    fn planner(snapshot: &ResourceSnapshot, existing: Vec<String>) -> GroupPlacementPlanner {
        let config = PlannerConfig {
            seed: Some(42),
            ..PlannerConfig::default()
        };
        GroupPlacementPlanner::new("hadoop1", Inventory::build(snapshot, &patterns()), existing, config)
    }

    #[test]
    fn places_whole_group_with_single_disks() {
        let snapshot = single_host_snapshot(8192, &[60 * GB, 60 * GB]);
        let mut planner = planner(&snapshot, Vec::new());
        let mut worker = group("worker", 3, 2048, 20 * GB, DiskType::Local);

        let result = planner.plan(&mut worker);

        assert_eq!(result.placed(), 3);
        assert!(result.shortfall.is_none());
        for vm in &result.vms {
            assert_eq!(vm.disks.len(), 1);
            assert_eq!(vm.disks[0].size_mb, 20 * GB);
            assert!(vm.disks[0].datastore.starts_with("local"));
            assert_eq!(vm.disks[0].path, format!("[{}] {}/data.vmdk", vm.disks[0].datastore, vm.name));
            assert_eq!(vm.system_datastore, "san");
        }
        let names: Vec<&str> = result.vms.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["hadoop1-worker-0", "hadoop1-worker-1", "hadoop1-worker-2"]);

        let inv = planner.inventory();
        assert_eq!(inv.find_host("h1").unwrap().unaccounted_mb, 6144);
        assert_eq!(inv.find_pool("c1", "rp1").unwrap().used_counter, 3);
        for name in ["local0", "local1"] {
            let d = inv.find_datastore(name).unwrap();
            assert!(d.unaccounted_mb <= 60 * GB - R);
            assert!(d.unaccounted_mb > 0, "round robin should use both local datastores");
        }
        assert_eq!(inv.find_datastore("san").unwrap().unaccounted_mb, 3 * DEFAULT_SYSTEM_DISK_MB);
    }

    #[test]
    fn pool_memory_limits_group() {
        let snapshot = single_host_snapshot(4096, &[60 * GB, 60 * GB]);
        let mut planner = planner(&snapshot, Vec::new());
        let mut worker = group("worker", 3, 2048, 20 * GB, DiskType::Local);

        let result = planner.plan(&mut worker);

        assert_eq!(result.placed(), 2);
        let shortfall = result.shortfall.unwrap();
        assert_eq!(shortfall.unplaced, 1);
        assert!(shortfall.message.contains("hadoop1-worker-2"));
        assert!(shortfall.message.contains("remaining 1 vm(s)"));
        assert!(shortfall.message.contains("rp1"));
    }

    #[test]
    fn datastore_capacity_is_never_overcommitted() {
        // 3 x 50 GiB cannot fit into 2 x (60 - 8) GiB.
        let snapshot = single_host_snapshot(8192, &[60 * GB, 60 * GB]);
        let mut planner = planner(&snapshot, Vec::new());
        let mut worker = group("worker", 3, 2048, 50 * GB, DiskType::Local);

        let result = planner.plan(&mut worker);

        assert_eq!(result.placed(), 2);
        assert_eq!(result.shortfall.as_ref().unwrap().unplaced, 1);
        assert!(result.shortfall.unwrap().message.contains("not enough local disk"));
        for name in ["local0", "local1"] {
            assert_eq!(planner.inventory().find_datastore(name).unwrap().unaccounted_mb, 50 * GB);
        }
        // The failed attempt released its system disk reservation.
        assert_eq!(
            planner.inventory().find_datastore("san").unwrap().unaccounted_mb,
            2 * DEFAULT_SYSTEM_DISK_MB
        );
    }

    #[test]
    fn stripes_only_when_no_single_datastore_fits() {
        let snapshot = single_host_snapshot(8192, &[40 * GB, 40 * GB]);
        let mut planner = planner(&snapshot, Vec::new());
        let mut big = group("big", 1, 1024, 50 * GB, DiskType::Local);

        let result = planner.plan(&mut big);

        assert_eq!(result.placed(), 1);
        let disks = &result.vms[0].disks;
        assert_eq!(disks.len(), 2);
        let total: u64 = disks.iter().map(|d| d.size_mb).sum();
        assert_eq!(total, 50 * GB);
        assert!(disks.iter().all(|d| d.size_mb <= 40 * GB - R));
        assert_ne!(disks[0].datastore, disks[1].datastore);
    }

    #[test]
    fn single_datastore_preferred_over_striping() {
        let snapshot = single_host_snapshot(8192, &[20 * GB, 80 * GB]);
        for seed in 0..8 {
            let config = PlannerConfig {
                seed: Some(seed),
                ..PlannerConfig::default()
            };
            let mut planner =
                GroupPlacementPlanner::new("c", Inventory::build(&snapshot, &patterns()), Vec::new(), config);
            let result = planner.plan(&mut group("g", 1, 1024, 30 * GB, DiskType::Local));
            assert_eq!(result.vms[0].disks.len(), 1, "seed {seed}");
            assert_eq!(result.vms[0].disks[0].datastore, "local1");
        }
    }

    #[test]
    fn evicted_datastore_is_not_reconsidered() {
        // local0 starts below the reserved remainder and must never be used,
        // even after local1 fills up.
        let snapshot = single_host_snapshot(1 << 20, &[R - 1, 30 * GB]);
        let mut planner = planner(&snapshot, Vec::new());

        let result = planner.plan(&mut group("g", 4, 1024, 10 * GB, DiskType::Local));

        assert_eq!(result.placed(), 2);
        assert!(result.vms.iter().all(|v| v.disks[0].datastore == "local1"));
        assert_eq!(planner.inventory().find_datastore("local0").unwrap().unaccounted_mb, 0);
    }

    #[test]
    fn existing_vms_are_skipped() {
        let snapshot = single_host_snapshot(8192, &[60 * GB]);
        let mut planner = planner(&snapshot, vec!["hadoop1-worker-1".to_string()]);
        let result = planner.plan(&mut group("worker", 3, 2048, 10 * GB, DiskType::Local));

        assert_eq!(result.existing, 1);
        let names: Vec<&str> = result.vms.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["hadoop1-worker-0", "hadoop1-worker-2"]);
        assert_eq!(planner.inventory().find_pool("c1", "rp1").unwrap().used_counter, 2);
    }

    #[test]
    fn host_without_memory_is_rejected() {
        let mut snapshot = single_host_snapshot(1 << 20, &[60 * GB]);
        snapshot.clusters[0].hosts[0].free_memory_mb = 3000;
        let mut planner = planner(&snapshot, Vec::new());

        let result = planner.plan(&mut group("g", 2, 2048, 0, DiskType::Shared));

        assert_eq!(result.placed(), 1);
        assert!(result.shortfall.unwrap().message.contains("hasn't enough memory"));
    }

    #[test]
    fn zero_size_request_gets_one_empty_disk() {
        let snapshot = single_host_snapshot(8192, &[60 * GB]);
        let mut planner = planner(&snapshot, Vec::new());

        let result = planner.plan(&mut group("g", 2, 1024, 0, DiskType::Local));

        assert_eq!(result.placed(), 2);
        for vm in &result.vms {
            assert_eq!(vm.disks.len(), 1);
            assert_eq!(vm.disks[0].size_mb, 0);
            assert_eq!(vm.disks[0].datastore, "local0");
            assert_eq!(vm.disks[0].path, format!("[local0] {}/data.vmdk", vm.name));
        }
        assert_eq!(planner.inventory().find_datastore("local0").unwrap().unaccounted_mb, 0);
    }

    #[test]
    fn zero_size_request_still_needs_a_candidate() {
        // No local datastore at all on the host.
        let snapshot = single_host_snapshot(8192, &[]);
        let mut planner = planner(&snapshot, Vec::new());

        let result = planner.plan(&mut group("g", 1, 1024, 0, DiskType::Local));

        assert_eq!(result.placed(), 0);
        assert!(result.shortfall.unwrap().message.contains("local disk"));
    }

    #[test]
    fn host_without_system_datastore_is_rejected() {
        let mut snapshot = single_host_snapshot(8192, &[60 * GB]);
        snapshot.clusters[0].datastores[0].free_space_mb = R;
        let mut planner = planner(&snapshot, Vec::new());

        let result = planner.plan(&mut group("g", 1, 1024, GB, DiskType::Local));

        assert_eq!(result.placed(), 0);
        assert!(result.shortfall.unwrap().message.contains("system datastore"));
    }

    fn two_pool_snapshot() -> ResourceSnapshot {
        ResourceSnapshot {
            datacenter: "dc".to_string(),
            clusters: vec![
                ClusterInventory {
                    name: "c1".to_string(),
                    resource_pools: vec![pool("rp1", 4096)],
                    hosts: vec![host("h1", 64 * GB, &["san1"])],
                    datastores: vec![ds("san1", 500 * GB)],
                    vms: Vec::new(),
                },
                ClusterInventory {
                    name: "c2".to_string(),
                    resource_pools: vec![ResourcePoolInfo {
                        name: "rp2".to_string(),
                        limit_mb: None,
                        free_memory_mb: 0,
                    }],
                    hosts: vec![host("h2", 64 * GB, &["san2"])],
                    datastores: vec![ds("san2", 500 * GB)],
                    vms: Vec::new(),
                },
            ],
            template: None,
        }
    }

    #[test]
    fn falls_over_to_next_pool_and_balances_groups() {
        let snapshot = two_pool_snapshot();
        let mut planner = planner(&snapshot, Vec::new());

        let mut first = group("master", 3, 2048, 10 * GB, DiskType::Shared);
        first.resource_pools = vec![ResourcePoolRef::new("c1", "rp1"), ResourcePoolRef::new("c2", "rp2")];
        let result = planner.plan(&mut first);

        // rp1 holds two VMs, the unlimited rp2 takes the third.
        assert_eq!(result.placed(), 3);
        assert_eq!(result.vms[0].resource_pool.name, "rp1");
        assert_eq!(result.vms[1].resource_pool.name, "rp1");
        assert_eq!(result.vms[2].resource_pool.name, "rp2");
        assert_eq!(result.vms[2].host, "h2");

        // The next group starts on the less used pool (rp2: 1 < rp1: 2)
        // even though rp1 is listed first.
        let mut second = group("worker", 1, 1024, 10 * GB, DiskType::Shared);
        second.resource_pools = vec![ResourcePoolRef::new("c1", "rp1"), ResourcePoolRef::new("c2", "rp2")];
        let result = planner.plan(&mut second);
        assert_eq!(result.vms[0].resource_pool.name, "rp2");

        let inv = planner.inventory();
        assert_eq!(inv.find_pool("c1", "rp1").unwrap().used_counter, 2);
        assert_eq!(inv.find_pool("c2", "rp2").unwrap().used_counter, 2);
        assert_eq!(inv.find_host("h2").unwrap().unaccounted_mb, 2048 + 1024);
    }

    #[test]
    fn round_robin_spreads_across_hosts() {
        let snapshot = ResourceSnapshot {
            datacenter: "dc".to_string(),
            clusters: vec![ClusterInventory {
                name: "c1".to_string(),
                resource_pools: vec![pool("rp1", 1 << 20)],
                hosts: vec![
                    host("h1", 64 * GB, &["san"]),
                    host("h2", 64 * GB, &["san"]),
                    host("h3", 64 * GB, &["san"]),
                ],
                datastores: vec![ds("san", 2000 * GB)],
                vms: Vec::new(),
            }],
            template: None,
        };
        let mut planner = planner(&snapshot, Vec::new());
        let result = planner.plan(&mut group("g", 6, 1024, GB, DiskType::Shared));

        assert_eq!(result.placed(), 6);
        for h in ["h1", "h2", "h3"] {
            assert_eq!(planner.inventory().find_host(h).unwrap().unaccounted_mb, 2048, "host {h}");
        }
    }

    #[test]
    fn unknown_pools_yield_shortfall() {
        let snapshot = single_host_snapshot(8192, &[60 * GB]);
        let mut planner = planner(&snapshot, Vec::new());
        let mut g = group("g", 2, 1024, GB, DiskType::Local);
        g.resource_pools = vec![ResourcePoolRef::new("nowhere", "rp")];

        let result = planner.plan(&mut g);

        assert_eq!(result.placed(), 0);
        let shortfall = result.shortfall.unwrap();
        assert_eq!(shortfall.unplaced, 2);
        assert!(shortfall.message.contains("no usable resource pool"));
    }

    #[test]
    fn network_addresses_are_assigned_until_exhausted() {
        let snapshot = single_host_snapshot(1 << 20, &[60 * GB]);
        let mut planner = planner(&snapshot, Vec::new());
        let mut g = group("g", 3, 1024, GB, DiskType::Local);
        g.network = Some(
            IpPool::from_spec(&NetworkSpec {
                name: "VM Network".to_string(),
                ranges: vec!["10.0.0.1-10.0.0.2".to_string()],
            })
            .unwrap(),
        );

        let result = planner.plan(&mut g);

        assert_eq!(result.placed(), 2);
        assert_eq!(result.vms[0].ip_address, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(result.vms[1].ip_address, Some(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(result.vms[0].network.as_deref(), Some("VM Network"));
        assert!(result.shortfall.unwrap().message.contains("no free address"));
    }

    #[test]
    fn placement_serializes_with_disk_paths() {
        let snapshot = single_host_snapshot(8192, &[60 * GB]);
        let mut planner = planner(&snapshot, Vec::new());
        let result = planner.plan(&mut group("worker", 1, 2048, 10 * GB, DiskType::Local));

        let json = serde_json::to_value(&result).unwrap();
        let vm = &json["vms"][0];
        assert_eq!(vm["name"], "hadoop1-worker-0");
        assert_eq!(vm["resource_pool"]["cluster"], "c1");
        assert_eq!(vm["disks"][0]["path"], "[local0] hadoop1-worker-0/data.vmdk");
        assert!(json["shortfall"].is_null());
    }

    #[test]
    fn same_seed_same_plan() {
        let snapshot = ResourceSnapshot {
            datacenter: "dc".to_string(),
            clusters: vec![ClusterInventory {
                name: "c1".to_string(),
                resource_pools: vec![pool("rp1", 1 << 20)],
                hosts: (0..5).map(|i| host(&format!("h{i}"), 64 * GB, &["san", "local-a", "local-b"])).collect(),
                datastores: vec![ds("san", 2000 * GB), ds("local-a", 500 * GB), ds("local-b", 500 * GB)],
                vms: Vec::new(),
            }],
            template: None,
        };
        let run = || {
            let mut p = planner(&snapshot, Vec::new());
            p.plan(&mut group("g", 7, 1024, 20 * GB, DiskType::Local))
        };
        assert_eq!(run(), run());
    }
}
