use std::path::{Path, PathBuf};

/// Settings location relative to the working directory.
pub const DEFAULT_SETTINGS: &str = "settings/settings.yaml";

/// Resolve the settings file.
///
/// Priority:
/// 1. `--settings` flag / `DOCKHAND_SETTINGS` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `settings/settings.yaml`
/// 3. Fall back to `cwd/settings/settings.yaml`
pub fn resolve_settings(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd).unwrap_or_else(|| cwd.join(DEFAULT_SETTINGS))
}

fn find_upward(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(DEFAULT_SETTINGS))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_path_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("elsewhere.yaml");
        assert_eq!(resolve_settings(Some(&path)), path);
    }

    #[test]
    fn finds_settings_in_parent() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("settings")).unwrap();
        std::fs::write(dir.path().join(DEFAULT_SETTINGS), "").unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            find_upward(&nested),
            Some(dir.path().join(DEFAULT_SETTINGS))
        );
    }

    #[test]
    fn missing_settings_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_upward(dir.path()), None);
    }
}
