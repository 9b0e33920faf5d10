use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::SpawnConfig;
use crate::xdg;

/// Project-level configuration file name
pub const CONFIG_FILE_NAME: &str = "fabrik-spawn.toml";

/// Discovers configuration by traversing up the directory tree
pub fn discover_config(start_dir: &Path) -> Result<Option<PathBuf>> {
    let mut current = start_dir.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Ok(Some(config_path));
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    // Fallback to global config
    if let Some(config_dir) = xdg::config_dir() {
        let global_config = config_dir.join("spawn.toml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// Loads configuration with auto-discovery support
///
/// If `explicit_path` is provided, loads config from that path.
/// Otherwise, auto-discovers config by traversing up directory tree from cwd.
///
/// Returns Ok(None) if no config is found (neither explicit nor discovered).
pub fn load_config_with_discovery(explicit_path: Option<&Path>) -> Result<Option<SpawnConfig>> {
    if let Some(config_path) = explicit_path {
        return Ok(Some(SpawnConfig::from_file(config_path)?));
    }

    let current_dir =
        std::env::current_dir().context("Failed to get current directory for config discovery")?;

    match discover_config(&current_dir)? {
        Some(discovered_path) => {
            tracing::debug!("Using config {}", discovered_path.display());
            Ok(Some(SpawnConfig::from_file(&discovered_path)?))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_discover_config_finds_nearest() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let project = root.join("project");
        let subdir = project.join("subdir");
        fs::create_dir_all(&subdir).unwrap();

        let config_path = project.join(CONFIG_FILE_NAME);
        fs::write(&config_path, "# test config").unwrap();

        let found = discover_config(&subdir).unwrap();
        assert_eq!(found, Some(config_path));
    }

    #[test]
    #[serial]
    fn test_discover_config_falls_back_to_global() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        let global = temp.path().join("xdg").join("fabrik");
        fs::create_dir_all(&project).unwrap();
        fs::create_dir_all(&global).unwrap();
        fs::write(global.join("spawn.toml"), "").unwrap();

        std::env::set_var("XDG_CONFIG_HOME", temp.path().join("xdg"));
        let found = discover_config(&project).unwrap();
        std::env::remove_var("XDG_CONFIG_HOME");

        assert_eq!(found, Some(global.join("spawn.toml")));
    }

    #[test]
    #[serial]
    fn test_explicit_path_is_loaded() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        fs::write(&path, "[execution]\nstrategy = \"sandboxed\"\n").unwrap();

        let config = load_config_with_discovery(Some(&path)).unwrap().unwrap();
        assert_eq!(config.execution.strategy, "sandboxed");
    }

    #[test]
    #[serial]
    fn test_explicit_missing_path_is_an_error() {
        let temp = TempDir::new().unwrap();
        assert!(load_config_with_discovery(Some(&temp.path().join("nope.toml"))).is_err());
    }
}
