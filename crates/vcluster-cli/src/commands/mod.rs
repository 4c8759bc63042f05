pub mod plan;
pub mod run;

use vcluster_core::{AdapterConfig, ClusterSpec, ProviderConfig};
use vcluster_orchestrator::{ClusterOrchestrator, InMemoryAdapter};

use crate::Target;

/// Load both files and build an orchestrator over the configured adapter.
pub fn load(
    target: &Target,
    retries: Option<u32>,
) -> anyhow::Result<(ClusterOrchestrator<InMemoryAdapter>, ClusterSpec)> {
    let mut provider = ProviderConfig::from_file(&target.provider)?;
    if let Some(retries) = retries {
        provider.deploy_retries = retries;
    }
    if target.seed.is_some() {
        provider.placement_seed = target.seed;
    }
    let spec = ClusterSpec::from_file(&target.cluster)?;

    let adapter = InMemoryAdapter::from_config(&provider)?;
    let orchestrator = ClusterOrchestrator::new(provider, adapter)?;
    Ok((orchestrator, spec))
}

/// Persist the in-memory inventory if the provider names a file for it.
pub fn save_inventory(target: &Target, adapter: &InMemoryAdapter) -> anyhow::Result<()> {
    let provider = ProviderConfig::from_file(&target.provider)?;
    let AdapterConfig::InMemory { inventory } = &provider.adapter;
    match inventory {
        Some(path) => {
            adapter.save(path)?;
            println!("✓ Inventory written to {}", path.display());
        }
        None => eprintln!("provider has no inventory file, nothing saved"),
    }
    Ok(())
}
