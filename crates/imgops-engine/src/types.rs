//! Common types for engine operations

use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

// Operating systems and architectures reported by the engine.
pub const OS_LINUX: &str = "linux";
pub const OS_WINDOWS: &str = "windows";

pub const ARCH_AMD64: &str = "amd64";
pub const ARCH_X86_64: &str = "x86_64";
pub const ARCH_ARM: &str = "arm";
pub const ARCH_ARM64: &str = "arm64";

/// Everything needed to build one image
#[derive(Debug, Clone, Default)]
pub struct BuildIntent {
    /// Repository URI; combined with each tag to name the image
    pub uri: String,
    /// Tags to apply. The first one is the canonical reference used for
    /// digest resolution after a push.
    pub tags: Vec<String>,
    /// Dockerfile passed via `-f`
    pub dockerfile: PathBuf,
    /// Build context, defaults to the Dockerfile's directory
    pub context: Option<PathBuf>,
    /// Target build stage
    pub target: Option<String>,
    /// Images to consider as cache sources
    pub cache_from: Vec<String>,
    /// Target platform as `os/arch`
    pub platform: Option<String>,
    /// `ARG` overrides
    pub args: HashMap<String, String>,
    /// Image labels
    pub labels: HashMap<String, String>,
}

impl BuildIntent {
    pub fn new(uri: impl Into<String>, dockerfile: impl Into<PathBuf>) -> Self {
        Self {
            uri: uri.into(),
            dockerfile: dockerfile.into(),
            ..Default::default()
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Everything needed to run one container
#[derive(Debug, Clone, Default)]
pub struct RunIntent {
    pub image: String,
    pub name: Option<String>,
    /// Host port -> container port
    pub ports: HashMap<String, String>,
    /// Overrides the image command when non-empty
    pub command: Vec<String>,
    pub env_vars: HashMap<String, String>,
    /// Passed exactly like `env_vars`, kept apart because they are sensitive
    pub secrets: HashMap<String, String>,
    /// Container whose network namespace to join
    pub network: Option<String>,
}

impl RunIntent {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }
}

/// `uri:tag`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference(String);

impl ImageReference {
    pub fn new(uri: &str, tag: &str) -> Self {
        Self(format!("{}:{}", uri, tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ImageReference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Content digest of a pushed image, e.g. `sha256:abcd...`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(pub String);

impl Digest {
    /// Extract the digest from a `repository@digest` string.
    ///
    /// The input must split on `@` into exactly two parts and the digest part
    /// must be non-empty.
    pub fn from_repo_digest(repo_digest: &str) -> Result<Self> {
        let parts: Vec<&str> = repo_digest.split('@').collect();
        match parts.as_slice() {
            [_, digest] if !digest.is_empty() => Ok(Self(digest.to_string())),
            _ => Err(EngineError::DigestParse {
                repo_digest: repo_digest.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Daemon `info` response; only server errors matter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineInfo {
    #[serde(rename = "ServerErrors", default)]
    pub server_errors: Vec<String>,
}

/// OS and architecture of the engine server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Platform {
    #[serde(rename = "Os", default)]
    pub os: String,
    #[serde(rename = "Arch", default)]
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", platform_string(&self.os, &self.arch))
    }
}

/// `os/arch`
pub fn platform_string(os: &str, arch: &str) -> String {
    format!("{}/{}", os, arch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_reference() {
        let image = ImageReference::new("123.dkr/repo", "v1");
        assert_eq!(image.as_str(), "123.dkr/repo:v1");
        assert_eq!(image.to_string(), "123.dkr/repo:v1");
    }

    #[test]
    fn test_digest_from_repo_digest() {
        let digest = Digest::from_repo_digest("123.dkr/repo@sha256:abcd").unwrap();
        assert_eq!(digest.as_str(), "sha256:abcd");
    }

    #[test]
    fn test_digest_rejects_missing_separator() {
        let err = Digest::from_repo_digest("123.dkr/repo:sha256").unwrap_err();
        assert!(matches!(err, EngineError::DigestParse { .. }));
    }

    #[test]
    fn test_digest_rejects_multiple_separators() {
        let err = Digest::from_repo_digest("a@b@sha256:abcd").unwrap_err();
        assert!(matches!(
            err,
            EngineError::DigestParse { repo_digest } if repo_digest == "a@b@sha256:abcd"
        ));
    }

    #[test]
    fn test_digest_rejects_empty_digest() {
        assert!(Digest::from_repo_digest("repo@").is_err());
        assert!(Digest::from_repo_digest("").is_err());
    }

    #[test]
    fn test_platform_string() {
        assert_eq!(platform_string(OS_LINUX, ARCH_ARM64), "linux/arm64");
        assert_eq!(Platform::new(OS_WINDOWS, ARCH_AMD64).to_string(), "windows/amd64");
    }

    #[test]
    fn test_engine_info_defaults_to_no_errors() {
        let info: EngineInfo = serde_json::from_str(r#"{"ID":"abc"}"#).unwrap();
        assert!(info.server_errors.is_empty());
    }
}
