use anyhow::Context;
use dockhand_core::{config::Settings, io};
use std::path::Path;

pub fn run(path: &Path) -> anyhow::Result<()> {
    let data = serde_yaml::to_string(&Settings::default())?;
    let created = io::write_if_missing(path, data.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;

    if created {
        println!("  created: {}", path.display());
        println!();
        println!("Add admins and permissions under `policy`, then run `dockhand serve`.");
    } else {
        println!("  exists:  {}", path.display());
    }
    Ok(())
}
