//! Registry credential helper detection
//!
//! Reads `~/.docker/config.json` (or the legacy `~/.dockercfg`) and reports
//! whether a registry is served by a given credential helper, either through
//! the global `credsStore` or a per-registry `credHelpers` entry.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Credential config locations relative to the home directory, in lookup order
pub const CREDENTIAL_CONFIG_PATHS: [&str; 2] = [".docker/config.json", ".dockercfg"];

/// Credential settings from the engine's client config file
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct CredentialConfig {
    /// Global credential store, e.g. "ecr-login", "desktop", "osxkeychain"
    pub creds_store: Option<String>,
    /// Per-registry credential helpers
    pub cred_helpers: HashMap<String, String>,
}

impl CredentialConfig {
    pub fn parse(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// True if `helper` is the global store or the helper for `host`
    pub fn uses_helper(&self, host: &str, helper: &str) -> bool {
        self.creds_store.as_deref() == Some(helper)
            || self.cred_helpers.get(host).map(String::as_str) == Some(helper)
    }
}

/// Why a credential helper could not be detected
#[derive(Error, Debug)]
pub enum CredentialProbeError {
    #[error("home directory is unknown")]
    NoHomeDir,

    #[error("registry URI {0:?} has no host")]
    EmptyRegistryHost(String),

    #[error("no readable credential config under {0}")]
    NoReadableConfig(PathBuf),
}

/// Registry host of a repository URI: everything before the first `/`
pub fn registry_host(uri: &str) -> &str {
    uri.split('/').next().unwrap_or_default()
}

/// Decide whether `uri`'s registry uses `helper`.
///
/// Config files are tried in [`CREDENTIAL_CONFIG_PATHS`] order; unreadable or
/// malformed files are skipped and the first one that parses decides.
pub fn probe_credential_helper(
    home: Option<&Path>,
    uri: &str,
    helper: &str,
) -> Result<bool, CredentialProbeError> {
    let home = home.ok_or(CredentialProbeError::NoHomeDir)?;
    let host = registry_host(uri);
    if host.is_empty() {
        return Err(CredentialProbeError::EmptyRegistryHost(uri.to_string()));
    }

    for relative in CREDENTIAL_CONFIG_PATHS {
        let path = home.join(relative);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("Skipping credential config {:?}: {}", path, e);
                continue;
            }
        };

        match CredentialConfig::parse(&content) {
            Ok(config) => return Ok(config.uses_helper(host, helper)),
            Err(e) => {
                tracing::debug!("Skipping malformed credential config {:?}: {}", path, e);
                continue;
            }
        }
    }

    Err(CredentialProbeError::NoReadableConfig(home.to_path_buf()))
}
