pub mod config;
pub mod init;
pub mod list;
pub mod serve;
pub mod unit;

use anyhow::Context;
use dockhand_core::config::Settings;
use std::path::Path;

/// Load settings, pointing at `dockhand init` when the file is missing.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    Settings::load(path).with_context(|| {
        format!(
            "failed to load {} (run `dockhand init` to create it)",
            path.display()
        )
    })
}
