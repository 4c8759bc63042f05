//! In-memory cloud adapter.
//!
//! Holds a [`ResourceSnapshot`] as the whole "datacenter". Provisioning
//! consumes capacity from it and adds the VM, destroying removes the VM and
//! returns its memory. Used for dry runs from the CLI and by the tests,
//! with switches to inject login, fetch and provisioning failures.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use vcluster_core::{
    AdapterConfig, DEFAULT_SYSTEM_DISK_MB, ExistingVm, ProviderConfig, ResourceSnapshot,
};
use vcluster_placement::VmPlacement;

use crate::adapter::CloudAdapter;
use crate::error::{AdapterError, AdapterResult};

#[derive(Debug, Clone, Default)]
pub struct InMemoryAdapter {
    snapshot: ResourceSnapshot,
    credentials: Option<(String, String)>,
    connected: bool,
    fail_login: bool,
    fail_fetch: bool,
    /// Remaining injected failures per VM name.
    fail_provision: HashMap<String, u32>,
    provisioned: Vec<String>,
    destroyed: Vec<String>,
    logins: u32,
    logouts: u32,
}

impl InMemoryAdapter {
    pub fn new(snapshot: ResourceSnapshot) -> Self {
        Self {
            snapshot,
            ..Self::default()
        }
    }

    /// Load the inventory from a JSON-serialized [`ResourceSnapshot`].
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: ResourceSnapshot = serde_json::from_str(&content)?;
        Ok(Self::new(snapshot))
    }

    /// Build the adapter a provider file selects.
    ///
    /// Without an inventory file the datacenter starts empty.
    pub fn from_config(provider: &ProviderConfig) -> anyhow::Result<Self> {
        let AdapterConfig::InMemory { inventory } = &provider.adapter;
        let adapter = match inventory {
            Some(path) => Self::from_file(path)?,
            None => Self::new(ResourceSnapshot {
                datacenter: provider.datacenter.clone(),
                ..ResourceSnapshot::default()
            }),
        };
        Ok(adapter.with_credentials(&provider.user, &provider.password))
    }

    /// Write the current inventory back as JSON.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(&self.snapshot)?)?;
        Ok(())
    }

    /// Require these credentials on login. Empty credentials accept anyone.
    pub fn with_credentials(mut self, user: &str, password: &str) -> Self {
        self.credentials = if user.is_empty() && password.is_empty() {
            None
        } else {
            Some((user.to_string(), password.to_string()))
        };
        self
    }

    pub fn fail_login(mut self) -> Self {
        self.fail_login = true;
        self
    }

    pub fn fail_fetch(mut self, fail: bool) -> Self {
        self.fail_fetch = fail;
        self
    }

    /// Make the next `times` provisioning attempts of `vm` fail.
    pub fn fail_provision(mut self, vm: &str, times: u32) -> Self {
        self.fail_provision.insert(vm.to_string(), times);
        self
    }

    pub fn set_fail_fetch(&mut self, fail: bool) {
        self.fail_fetch = fail;
    }

    pub fn snapshot(&self) -> &ResourceSnapshot {
        &self.snapshot
    }

    /// Names of VMs provisioned so far, in order.
    pub fn provisioned(&self) -> &[String] {
        &self.provisioned
    }

    /// Names of VMs destroyed so far, in order.
    pub fn destroyed(&self) -> &[String] {
        &self.destroyed
    }

    pub fn logins(&self) -> u32 {
        self.logins
    }

    pub fn logouts(&self) -> u32 {
        self.logouts
    }

    fn system_disk_mb(&self) -> u64 {
        self.snapshot.system_disk_mb().unwrap_or(DEFAULT_SYSTEM_DISK_MB)
    }

    fn consume_datastore(&mut self, name: &str, size_mb: u64) {
        for cluster in &mut self.snapshot.clusters {
            for ds in cluster.datastores.iter_mut().filter(|d| d.name == name) {
                ds.free_space_mb = ds.free_space_mb.saturating_sub(size_mb);
            }
        }
    }
}

impl CloudAdapter for InMemoryAdapter {
    fn login(&mut self, address: &str, user: &str, password: &str) -> AdapterResult<()> {
        let reject = |reason: &str| AdapterError::Login {
            address: address.to_string(),
            reason: reason.to_string(),
        };
        if self.fail_login {
            return Err(reject("endpoint unreachable"));
        }
        if let Some((u, p)) = &self.credentials {
            if u != user || p != password {
                return Err(reject("invalid credentials"));
            }
        }
        self.connected = true;
        self.logins += 1;
        debug!(%address, %user, "logged in");
        Ok(())
    }

    fn logout(&mut self) {
        if self.connected {
            self.connected = false;
            self.logouts += 1;
            debug!("logged out");
        }
    }

    fn fetch_datacenter(&mut self, datacenter: &str, template_id: &str) -> AdapterResult<ResourceSnapshot> {
        if !self.connected {
            return Err(AdapterError::NotConnected);
        }
        if self.fail_fetch {
            return Err(AdapterError::Fetch("inventory service unavailable".to_string()));
        }
        if self.snapshot.datacenter != datacenter {
            return Err(AdapterError::DatacenterNotFound(datacenter.to_string()));
        }
        if let Some(template) = &self.snapshot.template {
            if template.id != template_id {
                return Err(AdapterError::TemplateNotFound(template_id.to_string()));
            }
        }
        Ok(self.snapshot.clone())
    }

    fn provision(&mut self, vm: &VmPlacement) -> AdapterResult<()> {
        let fail = |reason: &str| AdapterError::Provision {
            vm: vm.name.clone(),
            reason: reason.to_string(),
        };
        if !self.connected {
            return Err(AdapterError::NotConnected);
        }
        if let Some(remaining) = self.fail_provision.get_mut(&vm.name).filter(|n| **n > 0) {
            *remaining -= 1;
            return Err(fail("injected clone failure"));
        }
        if self.snapshot.vms().any(|v| v.name == vm.name) {
            return Err(fail("a vm with this name already exists"));
        }

        let system_disk_mb = self.system_disk_mb();
        let cluster = self
            .snapshot
            .clusters
            .iter_mut()
            .find(|c| c.name == vm.resource_pool.cluster)
            .ok_or_else(|| fail("cluster not found"))?;
        let pool = cluster
            .resource_pools
            .iter_mut()
            .find(|p| p.name == vm.resource_pool.name)
            .ok_or_else(|| fail("resource pool not found"))?;
        pool.free_memory_mb = pool.free_memory_mb.saturating_sub(vm.memory_mb);
        let host = cluster
            .hosts
            .iter_mut()
            .find(|h| h.name == vm.host)
            .ok_or_else(|| fail("host not found"))?;
        host.free_memory_mb = host.free_memory_mb.saturating_sub(vm.memory_mb);

        cluster.vms.push(ExistingVm {
            name: vm.name.clone(),
            host: vm.host.clone(),
            resource_pool: Some(vm.resource_pool.name.clone()),
            memory_mb: vm.memory_mb,
            ip_address: vm.ip_address,
            powered_on: true,
        });

        self.consume_datastore(&vm.system_datastore, system_disk_mb);
        for disk in &vm.disks {
            self.consume_datastore(&disk.datastore, disk.size_mb);
        }
        self.provisioned.push(vm.name.clone());
        info!(vm = %vm.name, host = %vm.host, pool = %vm.resource_pool, "vm provisioned");
        Ok(())
    }

    fn destroy(&mut self, vm: &ExistingVm) -> AdapterResult<()> {
        if !self.connected {
            return Err(AdapterError::NotConnected);
        }
        for cluster in &mut self.snapshot.clusters {
            let Some(pos) = cluster.vms.iter().position(|v| v.name == vm.name) else {
                continue;
            };
            let removed = cluster.vms.remove(pos);
            if let Some(host) = cluster.hosts.iter_mut().find(|h| h.name == removed.host) {
                host.free_memory_mb += removed.memory_mb;
            }
            let pool = removed
                .resource_pool
                .as_ref()
                .and_then(|name| cluster.resource_pools.iter_mut().find(|p| &p.name == name));
            if let Some(pool) = pool {
                pool.free_memory_mb += removed.memory_mb;
            }
            self.destroyed.push(removed.name);
            info!(vm = %vm.name, "vm destroyed");
            return Ok(());
        }
        Err(AdapterError::VmNotFound(vm.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use vcluster_core::{ClusterInventory, DatastoreInfo, HostInfo, ResourcePoolInfo, ResourcePoolRef};
    use vcluster_placement::DiskPlacement;

    fn snapshot() -> ResourceSnapshot {
        ResourceSnapshot {
            datacenter: "dc1".to_string(),
            clusters: vec![ClusterInventory {
                name: "c1".to_string(),
                resource_pools: vec![ResourcePoolInfo {
                    name: "rp1".to_string(),
                    limit_mb: Some(8192),
                    free_memory_mb: 8192,
                }],
                hosts: vec![HostInfo {
                    name: "h1".to_string(),
                    handle: "host-1".to_string(),
                    free_memory_mb: 16384,
                    datastores: vec!["san1".to_string()],
                }],
                datastores: vec![DatastoreInfo {
                    name: "san1".to_string(),
                    free_space_mb: 100 * 1024,
                }],
                vms: Vec::new(),
            }],
            template: None,
        }
    }

    fn placement(name: &str) -> VmPlacement {
        VmPlacement {
            name: name.to_string(),
            cluster: "hadoop1".to_string(),
            group: "worker".to_string(),
            index: 0,
            host: "h1".to_string(),
            host_handle: "host-1".to_string(),
            resource_pool: ResourcePoolRef::new("c1", "rp1"),
            system_datastore: "san1".to_string(),
            template_id: "tmpl".to_string(),
            memory_mb: 2048,
            disks: vec![DiskPlacement {
                size_mb: 10 * 1024,
                datastore: "san1".to_string(),
                path: format!("[san1] {name}/data.vmdk"),
            }],
            network: None,
            ip_address: None,
            error: None,
        }
    }

    fn connected(adapter: InMemoryAdapter) -> InMemoryAdapter {
        let mut adapter = adapter;
        adapter.login("vc", "", "").unwrap();
        adapter
    }

    #[test]
    fn provision_consumes_capacity_and_records_vm() {
        let mut adapter = connected(InMemoryAdapter::new(snapshot()));
        adapter.provision(&placement("hadoop1-worker-0")).unwrap();

        let snap = adapter.fetch_datacenter("dc1", "tmpl").unwrap();
        let cluster = &snap.clusters[0];
        assert_eq!(cluster.resource_pools[0].free_memory_mb, 8192 - 2048);
        assert_eq!(cluster.hosts[0].free_memory_mb, 16384 - 2048);
        assert_eq!(
            cluster.datastores[0].free_space_mb,
            100 * 1024 - 10 * 1024 - DEFAULT_SYSTEM_DISK_MB
        );
        assert_eq!(cluster.vms[0].name, "hadoop1-worker-0");
        assert_eq!(adapter.provisioned(), ["hadoop1-worker-0"]);

        let again = adapter.provision(&placement("hadoop1-worker-0"));
        assert!(matches!(again, Err(AdapterError::Provision { .. })));
    }

    #[test]
    fn destroy_returns_memory() {
        let mut adapter = connected(InMemoryAdapter::new(snapshot()));
        adapter.provision(&placement("hadoop1-worker-0")).unwrap();
        let vm = adapter.snapshot().clusters[0].vms[0].clone();

        adapter.destroy(&vm).unwrap();
        assert!(adapter.snapshot().vms().next().is_none());
        assert_eq!(adapter.snapshot().clusters[0].hosts[0].free_memory_mb, 16384);
        assert_eq!(adapter.destroyed(), ["hadoop1-worker-0"]);
        assert!(matches!(adapter.destroy(&vm), Err(AdapterError::VmNotFound(_))));
    }

    #[test]
    fn injected_failures() {
        let mut adapter = InMemoryAdapter::new(snapshot()).fail_login();
        assert!(matches!(adapter.login("vc", "u", "p"), Err(AdapterError::Login { .. })));

        let mut adapter = connected(InMemoryAdapter::new(snapshot()).fail_provision("hadoop1-worker-0", 1));
        assert!(adapter.provision(&placement("hadoop1-worker-0")).is_err());
        assert!(adapter.provision(&placement("hadoop1-worker-0")).is_ok());

        adapter.set_fail_fetch(true);
        assert!(matches!(adapter.fetch_datacenter("dc1", "tmpl"), Err(AdapterError::Fetch(_))));
    }

    #[test]
    fn login_checks_credentials_and_logout_is_counted_once() {
        let mut adapter = InMemoryAdapter::new(snapshot()).with_credentials("admin", "secret");
        assert!(adapter.login("vc", "admin", "wrong").is_err());
        assert!(matches!(adapter.fetch_datacenter("dc1", "tmpl"), Err(AdapterError::NotConnected)));

        adapter.login("vc", "admin", "secret").unwrap();
        adapter.logout();
        adapter.logout();
        assert_eq!(adapter.logins(), 1);
        assert_eq!(adapter.logouts(), 1);
    }

    #[test]
    fn unknown_datacenter_is_an_error() {
        let mut adapter = connected(InMemoryAdapter::new(snapshot()));
        assert!(matches!(
            adapter.fetch_datacenter("dc9", "tmpl"),
            Err(AdapterError::DatacenterNotFound(_))
        ));
    }

    #[test]
    fn inventory_round_trips_through_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&snapshot()).unwrap().as_bytes()).unwrap();

        let mut adapter = connected(InMemoryAdapter::from_file(file.path()).unwrap());
        adapter.provision(&placement("hadoop1-worker-0")).unwrap();
        adapter.save(file.path()).unwrap();

        let reloaded = InMemoryAdapter::from_file(file.path()).unwrap();
        assert_eq!(reloaded.snapshot().vms().count(), 1);
    }
}
