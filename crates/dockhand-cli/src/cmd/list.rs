use std::path::Path;

use anyhow::Context;
use dockhand_core::permissions::{group_by_section, list_authorized_units};
use dockhand_core::registry::UnitRegistry;
use dockhand_core::types::{ActorId, RoleId, Unit};

use super::load_settings;
use crate::output::{print_json, print_table};

pub fn run(path: &Path, actor: ActorId, groups: &[RoleId], json: bool) -> anyhow::Result<()> {
    let settings = load_settings(path)?;
    let registry = UnitRegistry::new(dockhand_docker::connect(&settings.runtime)?);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(registry.refresh())
        .context("failed to list containers")?;

    let snapshot = registry.snapshot();
    let policy = settings.policy;
    let visible = list_authorized_units(actor, groups, &policy, &snapshot.units);
    let units: Vec<Unit> = snapshot
        .units
        .iter()
        .filter(|u| visible.contains(&u.name))
        .cloned()
        .collect();
    let sections = group_by_section(&units, &policy.section_order);

    if json {
        let value: Vec<_> = sections
            .iter()
            .map(|(section, units)| {
                serde_json::json!({
                    "section": section,
                    "units": units,
                })
            })
            .collect();
        return print_json(&value);
    }

    if units.is_empty() {
        println!("No units available to actor {actor}.");
        return Ok(());
    }

    let rows = sections
        .into_iter()
        .flat_map(|(section, units)| {
            units.into_iter().map(move |u| {
                vec![
                    section.clone(),
                    u.name,
                    if u.running { "running" } else { "stopped" }.to_string(),
                    u.status,
                ]
            })
        })
        .collect();
    print_table(&["SECTION", "UNIT", "STATE", "STATUS"], rows);
    Ok(())
}
