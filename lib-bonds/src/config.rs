//! Bonds Module Configuration
//!
//! Loaded from TOML; every section and field is optional:
//! ```toml
//! [bonds]
//! staking_denom = "stake"
//!
//! [storage]
//! path = "./data/bonds"
//! temporary = false
//! ```

use crate::storage::SledBondStore;
use anyhow::{anyhow, Context, Result};
use lib_types::is_valid_denom;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondsConfig {
    #[serde(default)]
    pub bonds: BondsSection,
    #[serde(default)]
    pub storage: StorageSection,
}

/// `[bonds]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondsSection {
    /// Denom that no bond may use as its token
    #[serde(default = "default_staking_denom")]
    pub staking_denom: String,
}

impl Default for BondsSection {
    fn default() -> Self {
        Self {
            staking_denom: default_staking_denom(),
        }
    }
}

fn default_staking_denom() -> String {
    "stake".to_string()
}

/// `[storage]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    /// Use a throwaway database; `path` is ignored
    #[serde(default)]
    pub temporary: bool,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            temporary: false,
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/bonds")
}

impl BondsConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse bonds config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bonds config {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bonds.staking_denom.is_empty() {
            return Err(anyhow!("bonds.staking_denom cannot be empty"));
        }
        if !is_valid_denom(&self.bonds.staking_denom) {
            return Err(anyhow!(
                "bonds.staking_denom '{}' is not a valid denom",
                self.bonds.staking_denom
            ));
        }
        if !self.storage.temporary && self.storage.path.as_os_str().is_empty() {
            return Err(anyhow!("storage.path cannot be empty unless storage.temporary is set"));
        }
        Ok(())
    }

    /// Open the configured sled store
    pub fn open_store(&self) -> Result<SledBondStore> {
        let store = if self.storage.temporary {
            SledBondStore::open_temporary().context("Failed to open temporary bond store")?
        } else {
            SledBondStore::open(&self.storage.path)
                .with_context(|| format!("Failed to open bond store at {}", self.storage.path.display()))?
        };
        tracing::info!("Bond store opened (temporary: {})", self.storage.temporary);
        Ok(store)
    }
}
