//! Engine configuration for imgops
//!
//! Located at `~/.config/imgops/config.toml`

use crate::{ConfigError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Credential helper that marks a registry as ECR-managed
pub const ECR_LOGIN_HELPER: &str = "ecr-login";

/// Top-level imgops configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: EngineSettings,
}

/// Settings for the external container engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Engine executable, resolved on `PATH`
    pub program: String,
    /// Name prefix of infrastructure (pause) containers that share another
    /// container's network namespace
    pub infra_container_prefix: String,
    /// Credential helper name that counts as "enabled" for a registry
    pub credential_helper: String,
    /// Deadline applied to every engine invocation, in seconds
    pub command_timeout_secs: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            infra_container_prefix: "pause".to_string(),
            credential_helper: ECR_LOGIN_HELPER.to_string(),
            command_timeout_secs: None,
        }
    }
}

impl EngineSettings {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

impl EngineConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            path: path.clone(),
            source: e,
        })?;

        if config.engine.program.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "engine.program must not be empty in {}",
                path.display()
            )));
        }

        tracing::debug!(
            "Loaded config from {:?}: program={}",
            path,
            config.engine.program
        );

        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Write the configuration to `path`, creating parent directories
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        let write_error = |source| ConfigError::WriteError {
            path: path.clone(),
            source,
        };
        let content = self.to_toml_string()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        std::fs::write(path, content).map_err(write_error)?;
        tracing::debug!("Wrote config to {:?}", path);
        Ok(())
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "imgops").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}
