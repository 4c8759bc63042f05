//! VM naming convention.
//!
//! Every VM the placement engine creates is named `{cluster}-{group}-{index}`.
//! The name is the only ownership marker on the infrastructure side, so
//! parsing must be total: a name that does not follow the convention is
//! simply "not ours".

use std::sync::LazyLock;

use regex::Regex;

static VM_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<cluster>.+)-(?P<group>[A-Za-z0-9_]+)-(?P<index>0|[1-9][0-9]*)$")
        .unwrap_or_else(|e| panic!("invalid built-in VM name pattern: {e}"))
});

/// Generate the VM name for instance `index` of `group` in `cluster`.
pub fn vm_name(cluster: &str, group: &str, index: u32) -> String {
    format!("{cluster}-{group}-{index}")
}

/// Whether `group` can be round-tripped through [`vm_name`] / [`VmName::parse`].
pub fn is_valid_group_name(group: &str) -> bool {
    !group.is_empty() && group.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The components of a VM name that follows the convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmName {
    pub cluster: String,
    pub group: String,
    pub index: u32,
}

impl VmName {
    /// Split a VM name back into cluster, group and index.
    ///
    /// Returns `None` for names outside the convention, including indices
    /// with leading zeros: a name is ours only if [`vm_name`] produces it.
    pub fn parse(name: &str) -> Option<Self> {
        let caps = VM_NAME.captures(name)?;
        let index = caps["index"].parse().ok()?;
        Some(Self {
            cluster: caps["cluster"].to_string(),
            group: caps["group"].to_string(),
            index,
        })
    }

    pub fn belongs_to(&self, cluster: &str) -> bool {
        self.cluster == cluster
    }
}

impl std::fmt::Display for VmName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&vm_name(&self.cluster, &self.group, self.index))
    }
}
