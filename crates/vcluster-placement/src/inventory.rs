//! Planning view of a resource snapshot.
//!
//! The snapshot's tree (cluster → pools/hosts → datastores) is flattened
//! into index-addressed arenas so a shared datastore mounted on several
//! hosts is one object, and speculative reservations made for one host are
//! visible from every other host that sees the same datastore.

use std::collections::HashMap;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use vcluster_core::{DatastorePatterns, ResourcePoolRef, ResourceSnapshot};

use crate::rotation::Rotation;

pub type PoolId = usize;
pub type HostId = usize;
pub type DatastoreId = usize;

/// A resource pool plus the memory reserved from it during this pass.
#[derive(Debug, Clone)]
pub struct PoolState {
    pub pool: ResourcePoolRef,
    pub(crate) cluster: usize,
    /// `None` means the pool has no memory ceiling.
    pub limit_mb: Option<u64>,
    pub free_memory_mb: u64,
    pub unaccounted_mb: u64,
    /// VMs assigned to this pool so far; lower counts are tried first.
    pub used_counter: u32,
}

impl PoolState {
    pub fn real_free_memory_mb(&self) -> u64 {
        self.free_memory_mb.saturating_sub(self.unaccounted_mb)
    }

    /// Unlimited pools always qualify, limited ones need the memory free.
    pub fn can_fit(&self, memory_mb: u64) -> bool {
        self.limit_mb.is_none() || self.real_free_memory_mb() >= memory_mb
    }
}

#[derive(Debug, Clone)]
pub struct HostState {
    pub name: String,
    pub handle: String,
    pub free_memory_mb: u64,
    pub unaccounted_mb: u64,
    pub shared: Vec<DatastoreId>,
    pub local: Vec<DatastoreId>,
    pub(crate) candidates: Option<DatastoreCandidates>,
}

impl HostState {
    pub fn real_free_memory_mb(&self) -> u64 {
        self.free_memory_mb.saturating_sub(self.unaccounted_mb)
    }
}

/// Per-host datastore rotations, shuffled once per pass.
#[derive(Debug, Clone)]
pub(crate) struct DatastoreCandidates {
    pub shared: Rotation<DatastoreId>,
    pub local: Rotation<DatastoreId>,
}

#[derive(Debug, Clone)]
pub struct DatastoreState {
    pub name: String,
    pub free_space_mb: u64,
    pub unaccounted_mb: u64,
}

impl DatastoreState {
    pub fn real_free_space_mb(&self) -> u64 {
        self.free_space_mb.saturating_sub(self.unaccounted_mb)
    }
}

#[derive(Debug, Clone)]
struct ClusterState {
    name: String,
    hosts: Vec<HostId>,
    host_order: Option<Vec<HostId>>,
}

/// Flattened, mutable copy of a snapshot for one planning pass.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    clusters: Vec<ClusterState>,
    pub(crate) pools: Vec<PoolState>,
    pub(crate) hosts: Vec<HostState>,
    pub(crate) datastores: Vec<DatastoreState>,
    pool_index: HashMap<ResourcePoolRef, PoolId>,
}

impl Inventory {
    /// Flatten `snapshot`, classifying each host's datastores with `patterns`.
    ///
    /// Datastores matching neither pattern list are left out of the host's
    /// candidates; datastores with the same name in several clusters are
    /// treated as one shared object.
    pub fn build(snapshot: &ResourceSnapshot, patterns: &DatastorePatterns) -> Self {
        let mut inv = Inventory::default();
        let mut datastore_index: HashMap<String, DatastoreId> = HashMap::new();

        for cluster in &snapshot.clusters {
            for ds in &cluster.datastores {
                if datastore_index.contains_key(&ds.name) {
                    continue;
                }
                datastore_index.insert(ds.name.clone(), inv.datastores.len());
                inv.datastores.push(DatastoreState {
                    name: ds.name.clone(),
                    free_space_mb: ds.free_space_mb,
                    unaccounted_mb: 0,
                });
            }
        }

        for cluster in &snapshot.clusters {
            let cluster_id = inv.clusters.len();
            let mut hosts = Vec::with_capacity(cluster.hosts.len());

            for host in &cluster.hosts {
                let mut shared = Vec::new();
                let mut local = Vec::new();
                for ds_name in &host.datastores {
                    let Some(&ds) = datastore_index.get(ds_name) else {
                        warn!(host = %host.name, datastore = %ds_name, "host references unknown datastore");
                        continue;
                    };
                    if patterns.is_shared(ds_name) {
                        shared.push(ds);
                    }
                    if patterns.is_local(ds_name) {
                        local.push(ds);
                    }
                }
                hosts.push(inv.hosts.len());
                inv.hosts.push(HostState {
                    name: host.name.clone(),
                    handle: host.handle.clone(),
                    free_memory_mb: host.free_memory_mb,
                    unaccounted_mb: 0,
                    shared,
                    local,
                    candidates: None,
                });
            }

            for rp in &cluster.resource_pools {
                let pool = ResourcePoolRef::new(&cluster.name, &rp.name);
                inv.pool_index.insert(pool.clone(), inv.pools.len());
                inv.pools.push(PoolState {
                    pool,
                    cluster: cluster_id,
                    limit_mb: rp.limit_mb,
                    free_memory_mb: rp.free_memory_mb,
                    unaccounted_mb: 0,
                    used_counter: 0,
                });
            }

            inv.clusters.push(ClusterState {
                name: cluster.name.clone(),
                hosts,
                host_order: None,
            });
        }

        debug!(
            datacenter = %snapshot.datacenter,
            clusters = inv.clusters.len(),
            pools = inv.pools.len(),
            hosts = inv.hosts.len(),
            datastores = inv.datastores.len(),
            "inventory built"
        );
        inv
    }

    pub fn pool_id(&self, pool: &ResourcePoolRef) -> Option<PoolId> {
        self.pool_index.get(pool).copied()
    }

    pub fn pool(&self, id: PoolId) -> &PoolState {
        &self.pools[id]
    }

    pub fn host(&self, id: HostId) -> &HostState {
        &self.hosts[id]
    }

    pub fn datastore(&self, id: DatastoreId) -> &DatastoreState {
        &self.datastores[id]
    }

    pub fn pools(&self) -> &[PoolState] {
        &self.pools
    }

    pub fn hosts(&self) -> &[HostState] {
        &self.hosts
    }

    pub fn datastores(&self) -> &[DatastoreState] {
        &self.datastores
    }

    pub fn find_pool(&self, cluster: &str, name: &str) -> Option<&PoolState> {
        self.pool_id(&ResourcePoolRef::new(cluster, name))
            .map(|id| &self.pools[id])
    }

    pub fn find_host(&self, name: &str) -> Option<&HostState> {
        self.hosts.iter().find(|h| h.name == name)
    }

    pub fn find_datastore(&self, name: &str) -> Option<&DatastoreState> {
        self.datastores.iter().find(|d| d.name == name)
    }

    pub fn cluster_name(&self, pool: PoolId) -> &str {
        &self.clusters[self.pools[pool].cluster].name
    }

    /// Hosts of a cluster in this pass's randomized order.
    pub(crate) fn host_order<R: Rng + ?Sized>(&mut self, cluster: usize, rng: &mut R) -> Vec<HostId> {
        let state = &mut self.clusters[cluster];
        if state.host_order.is_none() {
            let mut order = state.hosts.clone();
            order.shuffle(rng);
            state.host_order = Some(order);
        }
        state.host_order.clone().unwrap_or_default()
    }

    /// Shuffle a host's datastore candidates the first time it is visited.
    pub(crate) fn prepare_datastores<R: Rng + ?Sized>(&mut self, host: HostId, rng: &mut R) {
        let state = &mut self.hosts[host];
        if state.candidates.is_none() {
            state.candidates = Some(DatastoreCandidates {
                shared: Rotation::shuffled(state.shared.clone(), rng),
                local: Rotation::shuffled(state.local.clone(), rng),
            });
        }
    }
}
