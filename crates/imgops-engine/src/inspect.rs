//! Daemon health and platform inspection

use crate::{CmdOptions, EngineClient, EngineError, EngineInfo, Platform, Result};

/// `info` template dumping the whole response as JSON
pub const INFO_FORMAT: &str = "'{{json .}}'";
/// `version` template dumping the server section as JSON
pub const VERSION_FORMAT: &str = "'{{json .Server}}'";

/// Remove the quoting artifact around templated engine output.
///
/// Templates are passed as `'{{json ...}}'` without a shell, so the engine
/// echoes the single quotes back: `'{"ServerErrors":[...]}'\n`. This trims
/// surrounding whitespace, then at most one leading and one trailing `'`.
pub fn strip_quoting_artifact(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('\'').unwrap_or(trimmed);
    trimmed.strip_suffix('\'').unwrap_or(trimmed)
}

/// Drop the double quotes of a JSON string value such as `"repo@sha256:..."`
pub(crate) fn unquote_json_string(value: &str) -> &str {
    value.trim_matches('"')
}

/// Interpret `info` output: no server errors means the daemon is healthy
pub fn parse_engine_info(raw: &str) -> Result<()> {
    let info: EngineInfo =
        serde_json::from_str(strip_quoting_artifact(raw)).map_err(|source| {
            EngineError::ResponseParse {
                what: "engine info",
                source,
            }
        })?;

    if info.server_errors.is_empty() {
        return Ok(());
    }
    Err(EngineError::DaemonNotResponsive {
        message: info.server_errors.join("\n"),
    })
}

/// Interpret `version` server output
pub fn parse_platform(raw: &str) -> Result<Platform> {
    serde_json::from_str(strip_quoting_artifact(raw)).map_err(|source| EngineError::ResponseParse {
        what: "engine platform",
        source,
    })
}

impl EngineClient {
    fn ensure_engine_on_path(&self) -> Result<()> {
        match self.host.find_executable(&self.program) {
            Some(path) => {
                tracing::debug!("Using engine at {}", path.display());
                Ok(())
            }
            None => Err(EngineError::EngineNotFound {
                program: self.program.clone(),
            }),
        }
    }

    /// Check that the engine is installed and its daemon answers without
    /// server errors
    pub async fn check_engine_running(&self) -> Result<()> {
        self.ensure_engine_on_path()?;

        let args = vec!["info".to_string(), "-f".to_string(), INFO_FORMAT.to_string()];
        let output = self
            .run_cmd(&args, CmdOptions::default())
            .await
            .map_err(|e| EngineError::EngineInfo {
                source: Box::new(e),
            })?;

        parse_engine_info(&output.stdout)
    }

    /// OS and architecture of the engine server
    pub async fn platform(&self) -> Result<Platform> {
        self.ensure_engine_on_path()?;

        let args = vec![
            "version".to_string(),
            "-f".to_string(),
            VERSION_FORMAT.to_string(),
        ];
        let output = self
            .run_cmd(&args, CmdOptions::default())
            .await
            .map_err(|e| EngineError::EngineVersion {
                source: Box::new(e),
            })?;

        parse_platform(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_quoting_artifact() {
        assert_eq!(strip_quoting_artifact("'{\"a\":1}'\n"), "{\"a\":1}");
        assert_eq!(strip_quoting_artifact("  {\"a\":1}  "), "{\"a\":1}");
        // Only one quote is removed from each side
        assert_eq!(strip_quoting_artifact("''x''"), "'x'");
        assert_eq!(strip_quoting_artifact("'"), "");
    }

    #[test]
    fn test_unquote_json_string() {
        assert_eq!(
            unquote_json_string("\"repo@sha256:abcd\""),
            "repo@sha256:abcd"
        );
        assert_eq!(unquote_json_string("repo@sha256:abcd"), "repo@sha256:abcd");
    }

    #[test]
    fn test_engine_info_healthy() {
        assert!(parse_engine_info("'{\"ID\":\"x\",\"ServerErrors\":[]}'\n").is_ok());
        assert!(parse_engine_info("'{\"ID\":\"x\"}'").is_ok());
    }

    #[test]
    fn test_engine_info_server_errors() {
        let raw = r#"'{"ServerErrors":["Cannot connect to the Docker daemon","Is the docker daemon running?"]}'"#;
        let err = parse_engine_info(raw).unwrap_err();
        match err {
            EngineError::DaemonNotResponsive { message } => assert_eq!(
                message,
                "Cannot connect to the Docker daemon\nIs the docker daemon running?"
            ),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_engine_info_malformed() {
        let err = parse_engine_info("'not json'").unwrap_err();
        assert!(matches!(
            err,
            EngineError::ResponseParse { what: "engine info", .. }
        ));
    }

    #[test]
    fn test_parse_platform() {
        let raw = "'{\"Os\":\"linux\",\"Arch\":\"amd64\",\"Version\":\"24.0.7\"}'\n";
        let platform = parse_platform(raw).unwrap();
        assert_eq!(platform, Platform::new("linux", "amd64"));
        assert_eq!(platform.to_string(), "linux/amd64");
    }

    #[test]
    fn test_parse_platform_malformed() {
        let err = parse_platform("'{\"Os\":'").unwrap_err();
        assert!(matches!(
            err,
            EngineError::ResponseParse { what: "engine platform", .. }
        ));
    }
}
