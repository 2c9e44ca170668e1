//! CLI configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use stowage_fs::StorageConfig;
use stowage_storage::ProviderRecord;

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Façade settings.
    pub storage: StorageConfig,
    /// Provider records served to the façade.
    pub providers: Vec<ProviderRecord>,
}

/// Default configuration location: `<config_dir>/stowage/config.json`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("stowage").join("config.json"))
}

impl CliConfig {
    /// Load the configuration.
    ///
    /// An explicit path must exist. A missing file at the default location
    /// yields an empty configuration.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::read(path),
            None => match default_path() {
                Some(path) if path.exists() => Self::read(&path),
                _ => {
                    debug!("No configuration file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!(path = %path.display(), providers = config.providers.len(), "Loaded configuration");
        Ok(config)
    }
}
