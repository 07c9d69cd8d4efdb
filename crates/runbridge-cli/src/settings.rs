//! Configuration file location and loading.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use runbridge_core::BridgeConfig;

/// Get the default configuration file path
pub fn config_path() -> Result<PathBuf> {
    ProjectDirs::from("", "", "runbridge")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .context("Could not determine config directory")
}

/// Load an explicit config file, or the default one if it exists.
pub fn load(explicit: Option<&Path>) -> Result<BridgeConfig> {
    match explicit {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => {
            let path = config_path()?;
            log::debug!("Using config at {}", path.display());
            Ok(BridgeConfig::load_or_default(&path))
        }
    }
}
