//! Configuration Management
//!
//! Loads the list of drivers to run from
//! `<config_dir>/cloudscan/config.yaml` or an explicit path. Files ending in
//! `.json` are parsed as JSON, everything else as YAML.

use crate::driver::{DiscoveryFilter, DriverInput};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// User configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Drivers to run, in order
    #[serde(default)]
    pub drivers: Vec<DriverInput>,
    /// Call-time filter applied to every driver unless overridden
    #[serde(default)]
    pub discovery: DiscoveryFilter,
}

impl Config {
    /// Application directory under the user config dir
    pub fn app_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cloudscan"))
    }

    /// Get the default config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::app_dir().map(|p| p.join("config.yaml"))
    }

    /// Load `path`, or the default file. A missing default file gives an
    /// empty configuration; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let config = if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        };
        config.with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse YAML config")
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse JSON config")
    }

    /// Drivers to run. `only` selects one driver by id.
    pub fn selected_drivers(&self, only: Option<&str>) -> Result<Vec<DriverInput>> {
        let Some(id) = only else {
            return Ok(self.drivers.clone());
        };

        let selected: Vec<DriverInput> = self
            .drivers
            .iter()
            .filter(|d| d.id.as_deref() == Some(id))
            .cloned()
            .collect();
        if selected.is_empty() {
            bail!("No driver with id '{}' in configuration", id);
        }
        Ok(selected)
    }
}
