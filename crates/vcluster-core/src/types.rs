//! Shared types used across vcluster crates.
//!
//! All capacities are expressed in MiB. The snapshot types mirror what the
//! virtualization adapter reports for one datacenter; they are plain data
//! and carry no planning state.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::network::IpPool;

/// Default system disk size when the template reports no unit-0 disk (4 GiB).
pub const DEFAULT_SYSTEM_DISK_MB: u64 = 4 * 1024;

/// Free space a datastore must keep after any reservation (8 GiB).
pub const RESERVED_REMAINDER_MB: u64 = 8 * 1024;

// ── Desired state ────────────────────────────────────────────────

/// Where a group's data disks should live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskType {
    #[default]
    Shared,
    Local,
}

/// Per-instance resource requirement of a VM group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub memory_mb: u64,
    pub disk_size_mb: u64,
    pub disk_type: DiskType,
    pub template_id: String,
}

/// A resource pool, addressed by its owning cluster.
///
/// Pool names are only unique within a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourcePoolRef {
    pub cluster: String,
    pub name: String,
}

impl ResourcePoolRef {
    pub fn new(cluster: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourcePoolRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.cluster, self.name)
    }
}

/// A VM group ready for placement.
#[derive(Debug, Clone)]
pub struct VmGroupRequest {
    pub name: String,
    /// Desired number of instances, indexed `0..instances`.
    pub instances: u32,
    pub requirement: ResourceRequirement,
    /// Candidate pools in the order the user listed them.
    pub resource_pools: Vec<ResourcePoolRef>,
    /// Address pool VMs of this group draw from, if the group has a network.
    pub network: Option<IpPool>,
}

// ── Resource snapshot ────────────────────────────────────────────

/// Hierarchical view of one datacenter as reported by the adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub datacenter: String,
    #[serde(default)]
    pub clusters: Vec<ClusterInventory>,
    #[serde(default)]
    pub template: Option<TemplateInfo>,
}

impl ResourceSnapshot {
    /// Every VM in every cluster of the datacenter.
    pub fn vms(&self) -> impl Iterator<Item = &ExistingVm> {
        self.clusters.iter().flat_map(|c| c.vms.iter())
    }

    /// Size of the template's boot disk (unit 0), if reported.
    pub fn system_disk_mb(&self) -> Option<u64> {
        self.template.as_ref().and_then(|t| {
            t.disks
                .iter()
                .find(|d| d.unit_number == 0)
                .map(|d| d.size_mb)
        })
    }

    pub fn cluster(&self, name: &str) -> Option<&ClusterInventory> {
        self.clusters.iter().find(|c| c.name == name)
    }
}

/// VM template the clones are made from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub id: String,
    #[serde(default)]
    pub disks: Vec<TemplateDisk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDisk {
    pub unit_number: u32,
    pub size_mb: u64,
}

/// One compute cluster: its pools, hosts, datastores and VMs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterInventory {
    pub name: String,
    #[serde(default)]
    pub resource_pools: Vec<ResourcePoolInfo>,
    #[serde(default)]
    pub hosts: Vec<HostInfo>,
    #[serde(default)]
    pub datastores: Vec<DatastoreInfo>,
    #[serde(default)]
    pub vms: Vec<ExistingVm>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePoolInfo {
    pub name: String,
    /// Memory ceiling; `None` means unlimited.
    #[serde(default)]
    pub limit_mb: Option<u64>,
    pub free_memory_mb: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    pub name: String,
    /// Opaque infrastructure handle (managed object id).
    pub handle: String,
    pub free_memory_mb: u64,
    /// Names of the datastores mounted on this host.
    #[serde(default)]
    pub datastores: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatastoreInfo {
    pub name: String,
    pub free_space_mb: u64,
}

/// A VM already present in the datacenter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingVm {
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub resource_pool: Option<String>,
    #[serde(default)]
    pub memory_mb: u64,
    #[serde(default)]
    pub ip_address: Option<Ipv4Addr>,
    #[serde(default)]
    pub powered_on: bool,
}
