use vcluster_orchestrator::VmEntry;

use crate::Target;

pub fn plan(target: &Target) -> anyhow::Result<()> {
    let (mut orchestrator, spec) = super::load(target, None)?;
    let placements = orchestrator.plan(&spec)?;

    println!("{}", serde_json::to_string_pretty(&placements)?);
    for group in placements.iter().filter(|g| g.shortfall.is_some()) {
        if let Some(shortfall) = &group.shortfall {
            eprintln!("✗ {}: {}", group.group, shortfall.message);
        }
    }
    Ok(())
}

pub fn list(target: &Target, format: &str) -> anyhow::Result<()> {
    let (mut orchestrator, spec) = super::load(target, None)?;
    let vms = orchestrator.list(&spec)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&vms)?),
        _ => println!("{}", format_vms(&spec.name, &vms)),
    }
    Ok(())
}

fn format_vms(cluster: &str, vms: &[VmEntry]) -> String {
    if vms.is_empty() {
        return format!("cluster {cluster} has no vms");
    }
    let width = vms.iter().map(|v| v.name.len()).max().unwrap_or(0);
    let mut out = format!("{:<width$}  GROUP", "NAME");
    for vm in vms {
        out.push('\n');
        out.push_str(&format!("{:<width$}  {}", vm.name, vm.group));
    }
    out
}
