//! Error types for engine operations

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("tags to reference an image should not be empty for building and pushing into the repository {uri}")]
    EmptyTags { uri: String },

    #[error("container {image} needs a network to join")]
    MissingNetwork { image: String },

    #[error("generate build args: {0}")]
    CompileFailed(#[source] Box<EngineError>),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {}: {}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()), .stderr.trim())]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} was cancelled")]
    Cancelled { program: String },

    #[error("{program} timed out after {after:?}")]
    Timeout { program: String, after: Duration },

    #[error("building image: {source}")]
    BuildFailed {
        #[source]
        source: Box<EngineError>,
    },

    #[error("authenticate to {registry}: {source}")]
    AuthenticationFailed {
        registry: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error("push {image}: {source}")]
    PushFailed {
        image: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error("inspect image digest for {uri}: {source}")]
    InspectDigest {
        uri: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error("parse the digest from the repo digest '{repo_digest}'")]
    DigestParse { repo_digest: String },

    #[error("running container: {source}")]
    RunFailed {
        #[source]
        source: Box<EngineError>,
    },

    #[error("list containers: {source}")]
    ProcessList {
        #[source]
        source: Box<EngineError>,
    },

    #[error("get engine info: {source}")]
    EngineInfo {
        #[source]
        source: Box<EngineError>,
    },

    #[error("get engine version: {source}")]
    EngineVersion {
        #[source]
        source: Box<EngineError>,
    },

    #[error("{program} command not found on PATH")]
    EngineNotFound { program: String },

    #[error("engine daemon is not responsive: {message}")]
    DaemonNotResponsive { message: String },

    #[error("unmarshal {what}: {source}")]
    ResponseParse {
        what: &'static str,
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// The error this one wraps, if any
    pub fn inner(&self) -> Option<&EngineError> {
        match self {
            Self::CompileFailed(inner) => Some(&**inner),
            Self::BuildFailed { source }
            | Self::AuthenticationFailed { source, .. }
            | Self::PushFailed { source, .. }
            | Self::InspectDigest { source, .. }
            | Self::RunFailed { source }
            | Self::ProcessList { source }
            | Self::EngineInfo { source }
            | Self::EngineVersion { source } => Some(&**source),
            _ => None,
        }
    }

    /// Innermost engine error in the wrapping chain
    pub fn root(&self) -> &EngineError {
        let mut current = self;
        while let Some(inner) = current.inner() {
            current = inner;
        }
        current
    }

    /// True if the operation stopped because it was cancelled or hit its deadline
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled { .. } | Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_walks_wrapping() {
        let err = EngineError::BuildFailed {
            source: Box::new(EngineError::CompileFailed(Box::new(EngineError::EmptyTags {
                uri: "repo".into(),
            }))),
        };
        assert!(matches!(err.root(), EngineError::EmptyTags { .. }));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancellation_through_wrapping() {
        let err = EngineError::PushFailed {
            image: "repo:v1".into(),
            source: Box::new(EngineError::Cancelled {
                program: "docker".into(),
            }),
        };
        assert!(err.is_cancelled());

        let timeout = EngineError::Timeout {
            program: "docker".into(),
            after: Duration::from_secs(1),
        };
        assert!(timeout.is_cancelled());
    }

    #[test]
    fn test_command_failed_message_keeps_stderr() {
        let err = EngineError::CommandFailed {
            command: "docker push repo:v1".into(),
            code: Some(1),
            stderr: "denied: requested access to the resource is denied\n".into(),
        };
        assert_eq!(
            err.to_string(),
            "`docker push repo:v1` exited with status 1: denied: requested access to the resource is denied"
        );
    }

    #[test]
    fn test_wrapped_message_names_operation() {
        let err = EngineError::PushFailed {
            image: "repo:v2".into(),
            source: Box::new(EngineError::CommandFailed {
                command: "docker push repo:v2".into(),
                code: None,
                stderr: String::new(),
            }),
        };
        assert!(err.to_string().starts_with("push repo:v2: "));
        assert!(err.to_string().contains("status signal"));
    }
}
