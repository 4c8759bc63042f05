//! Provider and cluster configuration files.
//!
//! Two TOML documents drive a run: the provider file describes the
//! virtualization endpoint and which of its pools/datastores may be used,
//! the cluster file describes the desired VM groups.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::naming::is_valid_group_name;
use crate::network::{IpPool, NetworkSpec};
use crate::pattern::DatastorePatterns;
use crate::types::{DiskType, ResourcePoolRef, ResourceRequirement, VmGroupRequest};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub datacenter: String,
    pub clusters: Vec<ProviderCluster>,
    pub address: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub shared_datastore_patterns: Vec<String>,
    #[serde(default)]
    pub local_datastore_patterns: Vec<String>,
    pub adapter: AdapterConfig,
    /// Extra deploy attempts after the first one fails.
    #[serde(default)]
    pub deploy_retries: u32,
    /// Fixes host/datastore shuffling for reproducible placement.
    #[serde(default)]
    pub placement_seed: Option<u64>,
}

/// A compute cluster and the resource pools of it that may be used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCluster {
    pub name: String,
    pub resource_pools: Vec<String>,
}

/// Which adapter implementation talks to the virtualization layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AdapterConfig {
    /// Inventory held in memory, optionally seeded from a JSON snapshot.
    InMemory {
        #[serde(default)]
        inventory: Option<PathBuf>,
    },
}

impl ProviderConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: ProviderConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.is_empty() {
            return Err(ConfigError::Missing("name"));
        }
        if self.datacenter.is_empty() {
            return Err(ConfigError::Missing("datacenter"));
        }
        if self.address.is_empty() {
            return Err(ConfigError::Missing("address"));
        }
        if self.clusters.is_empty() {
            return Err(ConfigError::Missing("clusters"));
        }
        // Fail early on bad wildcards rather than at planning time.
        self.patterns()?;
        Ok(())
    }

    pub fn patterns(&self) -> ConfigResult<DatastorePatterns> {
        DatastorePatterns::new(
            &self.shared_datastore_patterns,
            &self.local_datastore_patterns,
        )
    }

    /// Every resource pool the provider allows, in file order.
    pub fn resource_pools(&self) -> Vec<ResourcePoolRef> {
        self.clusters
            .iter()
            .flat_map(|c| {
                c.resource_pools
                    .iter()
                    .map(|rp| ResourcePoolRef::new(&c.name, rp))
            })
            .collect()
    }
}

/// Desired state of one VM cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    pub template_id: String,
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    pub instances: u32,
    pub memory_mb: u64,
    pub disk_size_mb: u64,
    #[serde(default)]
    pub disk_type: DiskType,
    /// Restricts the group to these pools; empty means every provider pool.
    #[serde(default)]
    pub resource_pools: Vec<ResourcePoolRef>,
    #[serde(default)]
    pub network: Option<NetworkSpec>,
}

impl ClusterSpec {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let spec: ClusterSpec = toml::from_str(&content)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.is_empty() {
            return Err(ConfigError::Missing("name"));
        }
        let mut seen = HashSet::new();
        for group in &self.groups {
            let invalid = |reason: &str| ConfigError::InvalidGroup {
                group: group.name.clone(),
                reason: reason.to_string(),
            };
            if !is_valid_group_name(&group.name) {
                return Err(invalid("name must be non-empty and use only [A-Za-z0-9_]"));
            }
            if !seen.insert(group.name.as_str()) {
                return Err(invalid("duplicate group name"));
            }
            if group.memory_mb == 0 {
                return Err(invalid("memory_mb must be positive"));
            }
        }
        Ok(())
    }

    /// Resolve the groups against the provider into placement requests.
    pub fn group_requests(&self, provider: &ProviderConfig) -> ConfigResult<Vec<VmGroupRequest>> {
        let allowed = provider.resource_pools();
        self.groups
            .iter()
            .map(|group| {
                let resource_pools = if group.resource_pools.is_empty() {
                    allowed.clone()
                } else {
                    for rp in &group.resource_pools {
                        if !allowed.contains(rp) {
                            return Err(ConfigError::UnknownResourcePool {
                                cluster: rp.cluster.clone(),
                                pool: rp.name.clone(),
                            });
                        }
                    }
                    group.resource_pools.clone()
                };
                let network = group.network.as_ref().map(IpPool::from_spec).transpose()?;
                Ok(VmGroupRequest {
                    name: group.name.clone(),
                    instances: group.instances,
                    requirement: ResourceRequirement {
                        memory_mb: group.memory_mb,
                        disk_size_mb: group.disk_size_mb,
                        disk_type: group.disk_type,
                        template_id: self.template_id.clone(),
                    },
                    resource_pools,
                    network,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PROVIDER: &str = r#"
name = "vc-lab"
datacenter = "dc1"
address = "10.1.1.10"
user = "admin"
password = "secret"
shared_datastore_patterns = ["san*"]
local_datastore_patterns = ["local*"]
deploy_retries = 2

[[clusters]]
name = "c1"
resource_pools = ["rp1", "rp2"]

[[clusters]]
name = "c2"
resource_pools = ["rp1"]

[adapter]
kind = "in-memory"
inventory = "inventory.json"
"#;

    const CLUSTER: &str = r#"
name = "hadoop1"
template_id = "vm-template-1"

[[groups]]
name = "master"
instances = 1
memory_mb = 4096
disk_size_mb = 10240
disk_type = "shared"

[[groups]]
name = "worker"
instances = 3
memory_mb = 2048
disk_size_mb = 51200
disk_type = "local"
resource_pools = [{ cluster = "c2", name = "rp1" }]
network = { name = "VM Network", ranges = ["10.0.0.10-10.0.0.20"] }
"#;

    #[test]
    fn parse_provider() {
        let provider = ProviderConfig::from_toml_str(PROVIDER).unwrap();
        assert_eq!(provider.datacenter, "dc1");
        assert_eq!(provider.deploy_retries, 2);
        assert_eq!(provider.placement_seed, None);
        assert_eq!(
            provider.adapter,
            AdapterConfig::InMemory {
                inventory: Some(PathBuf::from("inventory.json"))
            }
        );
        assert_eq!(
            provider.resource_pools(),
            vec![
                ResourcePoolRef::new("c1", "rp1"),
                ResourcePoolRef::new("c1", "rp2"),
                ResourcePoolRef::new("c2", "rp1"),
            ]
        );
        let patterns = provider.patterns().unwrap();
        assert!(patterns.is_shared("san01"));
        assert!(patterns.is_local("local-h1"));
    }

    #[test]
    fn provider_requires_address() {
        let without = PROVIDER.replace("address = \"10.1.1.10\"", "address = \"\"");
        assert!(ProviderConfig::from_toml_str(&without).is_err());
    }

    #[test]
    fn cluster_groups_resolve_against_provider() {
        let provider = ProviderConfig::from_toml_str(PROVIDER).unwrap();
        let spec: ClusterSpec = toml::from_str(CLUSTER).unwrap();
        spec.validate().unwrap();

        let groups = spec.group_requests(&provider).unwrap();
        assert_eq!(groups.len(), 2);

        let master = &groups[0];
        assert_eq!(master.resource_pools.len(), 3);
        assert_eq!(master.requirement.template_id, "vm-template-1");
        assert!(master.network.is_none());

        let worker = &groups[1];
        assert_eq!(worker.requirement.disk_type, DiskType::Local);
        assert_eq!(worker.resource_pools, vec![ResourcePoolRef::new("c2", "rp1")]);
        assert_eq!(worker.network.as_ref().unwrap().available(), 11);
    }

    #[test]
    fn group_pool_must_be_allowed_by_provider() {
        let provider = ProviderConfig::from_toml_str(PROVIDER).unwrap();
        let spec: ClusterSpec =
            toml::from_str(&CLUSTER.replace("cluster = \"c2\"", "cluster = \"c9\"")).unwrap();
        assert!(matches!(
            spec.group_requests(&provider),
            Err(ConfigError::UnknownResourcePool { .. })
        ));
    }

    #[test]
    fn rejects_group_names_that_break_vm_naming() {
        let spec: ClusterSpec =
            toml::from_str(&CLUSTER.replace("name = \"worker\"", "name = \"data-node\"")).unwrap();
        assert!(matches!(spec.validate(), Err(ConfigError::InvalidGroup { .. })));
    }

    #[test]
    fn rejects_duplicate_groups() {
        let spec: ClusterSpec =
            toml::from_str(&CLUSTER.replace("name = \"worker\"", "name = \"master\"")).unwrap();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn cluster_spec_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CLUSTER.as_bytes()).unwrap();

        let spec = ClusterSpec::from_file(file.path()).unwrap();
        assert_eq!(spec.name, "hadoop1");
        assert_eq!(spec.groups[1].instances, 3);
    }
}
