//! VM lifecycle registry.
//!
//! Every VM a run knows about sits in exactly one [`VmBucket`]. All buckets
//! live in one map behind one lock, so a move is a single update and a
//! reader can never see a VM in two buckets or in none. The orchestrator
//! is the only writer; progress pollers read concurrently.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use vcluster_core::VmName;

/// Lifecycle partition of a tracked VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmBucket {
    /// Present on the infrastructure before this run touched it.
    Existing,
    /// Planned, not yet handed to the adapter.
    Preparing,
    /// Being provisioned.
    Deploying,
    Finished,
    Failed,
}

/// One VM of a progress listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmEntry {
    pub name: String,
    pub cluster: String,
    pub group: String,
    /// Whether the VM exists on the infrastructure.
    pub created: bool,
}

/// Consistent view of the registry at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub preparing: usize,
    pub deploying: usize,
    pub existing: usize,
    pub finished: usize,
    pub failed: usize,
    /// `preparing + deploying + existing`
    pub running: usize,
    /// `running + finished + failed`
    pub total: usize,
    pub succeeded: bool,
    pub vms: Vec<VmEntry>,
}

#[derive(Debug, Default)]
pub struct VmRegistry {
    vms: Mutex<BTreeMap<String, VmBucket>>,
}

impl VmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, VmBucket>> {
        self.vms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `name` in `bucket`, moving it out of any bucket it was in.
    ///
    /// Returns the bucket it previously occupied.
    pub fn insert(&self, name: &str, bucket: VmBucket) -> Option<VmBucket> {
        self.lock().insert(name.to_string(), bucket)
    }

    /// Track `name`, found on the infrastructure, as existing.
    ///
    /// A VM this run already finished stays finished. Returns whether the
    /// VM is now in `Existing`.
    pub fn observe_existing(&self, name: &str) -> bool {
        let mut vms = self.lock();
        match vms.get(name) {
            Some(VmBucket::Finished) => false,
            _ => {
                vms.insert(name.to_string(), VmBucket::Existing);
                true
            }
        }
    }

    /// Move `name` from `from` to `to`.
    ///
    /// Does nothing and returns false if `name` is not in `from`.
    pub fn move_vm(&self, name: &str, from: VmBucket, to: VmBucket) -> bool {
        let mut vms = self.lock();
        match vms.get_mut(name) {
            Some(bucket) if *bucket == from => {
                *bucket = to;
                debug!(vm = %name, ?from, ?to, "vm moved");
                true
            }
            _ => false,
        }
    }

    /// Move every VM in `from` to `to`; returns how many moved.
    pub fn move_all(&self, from: VmBucket, to: VmBucket) -> usize {
        let mut vms = self.lock();
        let mut moved = 0;
        for bucket in vms.values_mut().filter(|b| **b == from) {
            *bucket = to;
            moved += 1;
        }
        moved
    }

    pub fn bucket_of(&self, name: &str) -> Option<VmBucket> {
        self.lock().get(name).copied()
    }

    pub fn names_in(&self, bucket: VmBucket) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(_, b)| **b == bucket)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Counts and listing under one lock acquisition.
    ///
    /// Planned VMs that have not reached the adapter yet are counted but not
    /// listed; names outside the naming convention are left out of the listing.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let vms = self.lock();
        let mut snap = RegistrySnapshot::default();
        for (name, bucket) in vms.iter() {
            let created = match bucket {
                VmBucket::Preparing => {
                    snap.preparing += 1;
                    continue;
                }
                VmBucket::Deploying => {
                    snap.deploying += 1;
                    false
                }
                VmBucket::Existing => {
                    snap.existing += 1;
                    true
                }
                VmBucket::Finished => {
                    snap.finished += 1;
                    true
                }
                VmBucket::Failed => {
                    snap.failed += 1;
                    false
                }
            };
            if let Some(parsed) = VmName::parse(name) {
                snap.vms.push(VmEntry {
                    name: name.clone(),
                    cluster: parsed.cluster,
                    group: parsed.group,
                    created,
                });
            }
        }
        snap.running = snap.preparing + snap.deploying + snap.existing;
        snap.total = snap.running + snap.finished + snap.failed;
        snap.succeeded = snap.failed == 0;
        snap
    }
}
