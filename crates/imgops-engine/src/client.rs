//! Image operations against the container engine CLI
//!
//! Build, login, push and run are compiled into engine subcommands and
//! executed through a [`CommandRunner`].

use crate::credentials::{probe_credential_helper, CredentialProbeError};
use crate::inspect::{strip_quoting_artifact, unquote_json_string};
use crate::{
    BuildIntent, CmdOptions, CmdOutput, CommandRunner, Digest, EngineError, ImageReference,
    Result, RunIntent, TokioRunner,
};
use imgops_config::{EngineConfig, EngineSettings, HostEnv};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// `inspect` template printing the first repository digest of an image
pub const REPO_DIGEST_FORMAT: &str = "'{{json (index .RepoDigests 0)}}'";

/// Client for one container engine executable
#[derive(Clone)]
pub struct EngineClient {
    pub(crate) runner: Arc<dyn CommandRunner>,
    pub(crate) host: HostEnv,
    /// Engine executable ("docker", "podman", ...)
    pub(crate) program: String,
    infra_prefix: String,
    credential_helper: String,
}

impl EngineClient {
    /// Create a client with default engine settings
    pub fn new(runner: Arc<dyn CommandRunner>, host: HostEnv) -> Self {
        Self::with_settings(runner, host, &EngineSettings::default())
    }

    pub fn with_settings(
        runner: Arc<dyn CommandRunner>,
        host: HostEnv,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            runner,
            host,
            program: settings.program.clone(),
            infra_prefix: settings.infra_container_prefix.clone(),
            credential_helper: settings.credential_helper.clone(),
        }
    }

    /// Create a client that spawns real processes
    pub fn from_config(config: &EngineConfig, host: HostEnv) -> Self {
        let runner = TokioRunner::with_timeout(config.engine.command_timeout());
        Self::with_settings(Arc::new(runner), host, &config.engine)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn host(&self) -> &HostEnv {
        &self.host
    }

    pub(crate) async fn run_cmd(&self, args: &[String], opts: CmdOptions) -> Result<CmdOutput> {
        self.runner.run(&self.program, args, opts).await
    }

    async fn run_cmd_cancellable(
        &self,
        cancel: &CancellationToken,
        args: &[String],
        opts: CmdOptions,
    ) -> Result<CmdOutput> {
        self.runner
            .run_with_cancel(cancel, &self.program, args, opts)
            .await
    }

    /// Build an image, streaming engine output to `output`
    pub async fn build(
        &self,
        cancel: &CancellationToken,
        intent: &BuildIntent,
        output: mpsc::UnboundedSender<String>,
    ) -> Result<()> {
        let args = intent
            .to_args(self.host.is_ci())
            .map_err(|e| EngineError::BuildFailed {
                source: Box::new(EngineError::CompileFailed(Box::new(e))),
            })?;

        tracing::info!("Building {}", intent.images()[0]);
        self.run_cmd_cancellable(cancel, &args, CmdOptions::stream(output))
            .await
            .map_err(|e| EngineError::BuildFailed {
                source: Box::new(e),
            })?;
        Ok(())
    }

    /// Log in to a registry. The password goes through stdin, never argv.
    pub async fn login(&self, uri: &str, username: &str, password: &str) -> Result<()> {
        let args = vec![
            "login".to_string(),
            "-u".to_string(),
            username.to_string(),
            "--password-stdin".to_string(),
            uri.to_string(),
        ];

        self.run_cmd(&args, CmdOptions::stdin(password))
            .await
            .map_err(|e| EngineError::AuthenticationFailed {
                registry: uri.to_string(),
                source: Box::new(e),
            })?;
        Ok(())
    }

    /// Push every tag of `uri` in order and return the pushed content digest.
    ///
    /// Stops at the first failed push. The digest is read from the image of
    /// the first tag only: all tags of a single-manifest push share one
    /// content digest.
    pub async fn push(
        &self,
        cancel: &CancellationToken,
        uri: &str,
        output: mpsc::UnboundedSender<String>,
        tags: &[String],
    ) -> Result<Digest> {
        let Some(first) = tags.first() else {
            return Err(EngineError::EmptyTags {
                uri: uri.to_string(),
            });
        };
        let quiet = self.host.is_ci();

        for tag in tags {
            let image = ImageReference::new(uri, tag);
            let mut args = vec!["push".to_string(), image.to_string()];
            if quiet {
                args.push("--quiet".to_string());
            }

            tracing::info!("Pushing {}", image);
            self.run_cmd_cancellable(cancel, &args, CmdOptions::stream(output.clone()))
                .await
                .map_err(|e| EngineError::PushFailed {
                    image: image.to_string(),
                    source: Box::new(e),
                })?;
        }

        self.image_digest(cancel, uri, first).await
    }

    /// Content digest of `uri:tag` from its first repository digest
    pub async fn image_digest(
        &self,
        cancel: &CancellationToken,
        uri: &str,
        tag: &str,
    ) -> Result<Digest> {
        let image = ImageReference::new(uri, tag);
        let args = vec![
            "inspect".to_string(),
            "--format".to_string(),
            REPO_DIGEST_FORMAT.to_string(),
            image.to_string(),
        ];

        let output = self
            .run_cmd_cancellable(cancel, &args, CmdOptions::default())
            .await
            .map_err(|e| EngineError::InspectDigest {
                uri: uri.to_string(),
                source: Box::new(e),
            })?;

        let repo_digest = unquote_json_string(strip_quoting_artifact(&output.stdout));
        let digest = Digest::from_repo_digest(repo_digest)?;
        tracing::debug!("Digest of {}: {}", image, digest);
        Ok(digest)
    }

    /// Run a single container to completion, streaming its output to `output`
    pub async fn run_container(
        &self,
        cancel: &CancellationToken,
        intent: &RunIntent,
        output: mpsc::UnboundedSender<String>,
    ) -> Result<()> {
        let args = intent
            .to_args(&self.infra_prefix)
            .map_err(|e| EngineError::RunFailed {
                source: Box::new(EngineError::CompileFailed(Box::new(e))),
            })?;

        tracing::info!("Running {}", intent.image);
        self.run_cmd_cancellable(cancel, &args, CmdOptions::stream(output))
            .await
            .map_err(|e| EngineError::RunFailed {
                source: Box::new(e),
            })?;
        Ok(())
    }

    /// True if a container whose name matches `name` is running
    pub async fn is_container_running(&self, name: &str) -> Result<bool> {
        let args = vec![
            "ps".to_string(),
            "-q".to_string(),
            "--filter".to_string(),
            format!("name={}", name),
        ];

        let output = self
            .run_cmd(&args, CmdOptions::default())
            .await
            .map_err(|e| EngineError::ProcessList {
                source: Box::new(e),
            })?;
        Ok(!output.stdout.trim().is_empty())
    }

    /// Detect the configured credential helper for `uri`, keeping the reason
    /// when detection is impossible
    pub fn probe_credential_helper(&self, uri: &str) -> std::result::Result<bool, CredentialProbeError> {
        probe_credential_helper(self.host.home(), uri, &self.credential_helper)
    }

    /// True if the configured credential helper (default `ecr-login`) serves
    /// `uri`'s registry. Any failure to tell counts as `false`.
    pub fn is_credential_helper_enabled(&self, uri: &str) -> bool {
        match self.probe_credential_helper(uri) {
            Ok(enabled) => enabled,
            Err(e) => {
                tracing::debug!("Credential helper detection for {} failed: {}", uri, e);
                false
            }
        }
    }
}

impl std::fmt::Debug for EngineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineClient")
            .field("program", &self.program)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}
