//! Desired vs. existing cluster comparison.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use vcluster_core::{VmGroupRequest, VmName, vm_name};

/// Instances a group still lacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupChange {
    pub group: String,
    pub missing: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDiff {
    pub changes: Vec<GroupChange>,
    /// Existing VMs the desired state no longer asks for. Never destroyed.
    pub surplus: Vec<String>,
}

impl ClusterDiff {
    /// Compare the desired groups of `cluster` with its existing VMs.
    pub fn compute(cluster: &str, desired: &[VmGroupRequest], existing: &[VmName]) -> Self {
        let mut present: HashMap<&str, BTreeSet<u32>> = HashMap::new();
        for vm in existing.iter().filter(|vm| vm.belongs_to(cluster)) {
            present.entry(vm.group.as_str()).or_default().insert(vm.index);
        }

        let mut diff = ClusterDiff::default();
        for group in desired {
            let have = present.remove(group.name.as_str()).unwrap_or_default();
            let missing: Vec<u32> = (0..group.instances).filter(|i| !have.contains(i)).collect();
            diff.surplus.extend(
                have.iter()
                    .filter(|&&i| i >= group.instances)
                    .map(|&i| vm_name(cluster, &group.name, i)),
            );
            if !missing.is_empty() {
                diff.changes.push(GroupChange {
                    group: group.name.clone(),
                    missing,
                });
            }
        }
        for (group, indices) in present {
            diff.surplus.extend(indices.into_iter().map(|i| vm_name(cluster, group, i)));
        }
        diff.surplus.sort();
        diff
    }

    /// True when every desired instance already exists.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.changes.iter().map(|c| c.missing.len()).sum()
    }
}
