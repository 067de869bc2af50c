//! Process execution for engine commands
//!
//! The engine client never spawns processes itself; it goes through a
//! [`CommandRunner`] so tests can record invocations and script outcomes.

use crate::{EngineError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Stdio wiring for a single invocation
#[derive(Debug, Default, Clone)]
pub struct CmdOptions {
    /// Written to the child's stdin, which is then closed
    pub stdin: Option<String>,
    /// Receives stdout and stderr line by line as they are produced.
    /// Only the last [`FORWARDED_TAIL_LINES`] lines of a forwarded stream
    /// are kept in [`CmdOutput`].
    pub output: Option<mpsc::UnboundedSender<String>>,
}

impl CmdOptions {
    pub fn stdin(input: impl Into<String>) -> Self {
        Self {
            stdin: Some(input.into()),
            output: None,
        }
    }

    pub fn stream(output: mpsc::UnboundedSender<String>) -> Self {
        Self {
            stdin: None,
            output: Some(output),
        }
    }
}

/// Lines of a forwarded stream kept for [`CmdOutput`] and error reports
pub const FORWARDED_TAIL_LINES: usize = 200;

/// Captured output of a successful invocation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. A non-zero exit is an error.
    async fn run(&self, program: &str, args: &[String], opts: CmdOptions) -> Result<CmdOutput>;

    /// Run to completion, killing the child if `cancel` fires first
    async fn run_with_cancel(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[String],
        opts: CmdOptions,
    ) -> Result<CmdOutput>;
}

/// Human-readable command line for logs and errors
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// [`CommandRunner`] backed by `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct TokioRunner {
    timeout: Option<Duration>,
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
    TimedOut(Duration),
}

impl TokioRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a deadline to every invocation
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    async fn execute(
        &self,
        cancel: Option<&CancellationToken>,
        program: &str,
        args: &[String],
        opts: CmdOptions,
    ) -> Result<CmdOutput> {
        let command = command_line(program, args);
        tracing::debug!("Running: {}", command);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if opts.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| EngineError::Spawn {
            program: program.to_string(),
            source,
        })?;

        // Written from its own task so a child that never reads stdin still
        // observes cancellation and the deadline.
        let stdin_task = match (opts.stdin, child.stdin.take()) {
            (Some(input), Some(mut stdin)) => {
                let name = program.to_string();
                Some(tokio::spawn(async move {
                    // A child that exits early closes its stdin; its exit
                    // status is the error worth reporting.
                    if let Err(e) = stdin.write_all(input.as_bytes()).await {
                        tracing::debug!("Failed to write stdin of {}: {}", name, e);
                    }
                }))
            }
            _ => None,
        };

        // Drain both pipes concurrently so neither fills up and blocks the child.
        let stdout_task = tokio::spawn(read_stream_lines(child.stdout.take(), opts.output.clone()));
        let stderr_task = tokio::spawn(read_stream_lines(child.stderr.take(), opts.output));

        let pumps: Vec<AbortHandle> = [&stdout_task, &stderr_task]
            .into_iter()
            .map(JoinHandle::abort_handle)
            .chain(stdin_task.iter().map(JoinHandle::abort_handle))
            .collect();

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = wait_cancelled(cancel) => Outcome::Cancelled,
            _ = wait_deadline(self.timeout) => Outcome::TimedOut(self.timeout.unwrap_or_default()),
        };

        let status = match outcome {
            Outcome::Exited(status) => status?,
            Outcome::Cancelled => {
                tracing::debug!("{} cancelled", command);
                stop_child(&mut child, program, &pumps).await;
                return Err(EngineError::Cancelled {
                    program: program.to_string(),
                });
            }
            Outcome::TimedOut(after) => {
                tracing::warn!("{} timed out after {:?}", command, after);
                stop_child(&mut child, program, &pumps).await;
                return Err(EngineError::Timeout {
                    program: program.to_string(),
                    after,
                });
            }
        };

        let stdout = join_output(stdout_task).await?;
        let stderr = join_output(stderr_task).await?;

        if !status.success() {
            return Err(EngineError::CommandFailed {
                command,
                code: status.code(),
                stderr,
            });
        }

        Ok(CmdOutput { stdout, stderr })
    }
}

#[async_trait]
impl CommandRunner for TokioRunner {
    async fn run(&self, program: &str, args: &[String], opts: CmdOptions) -> Result<CmdOutput> {
        self.execute(None, program, args, opts).await
    }

    async fn run_with_cancel(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[String],
        opts: CmdOptions,
    ) -> Result<CmdOutput> {
        self.execute(Some(cancel), program, args, opts).await
    }
}

async fn stop_child(
    child: &mut tokio::process::Child,
    program: &str,
    pumps: &[AbortHandle],
) {
    if let Err(e) = child.start_kill() {
        tracing::warn!("Failed to kill {}: {}", program, e);
    }
    let _ = child.wait().await;
    for pump in pumps {
        pump.abort();
    }
}

async fn wait_cancelled(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn wait_deadline(timeout: Option<Duration>) {
    match timeout {
        Some(after) => tokio::time::sleep(after).await,
        None => std::future::pending().await,
    }
}

/// Read a child stream line by line, forwarding to `progress` when present.
///
/// Engine output is not guaranteed to be UTF-8 (a `RUN` step can print
/// anything), so invalid bytes are replaced rather than failing the read.
/// A forwarded stream keeps only its tail.
async fn read_stream_lines<R>(
    stream: Option<R>,
    progress: Option<mpsc::UnboundedSender<String>>,
) -> std::io::Result<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return Ok(String::new());
    };

    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut kept = VecDeque::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = decode_line(&buf);
        if let Some(ref tx) = progress {
            let _ = tx.send(line.clone());
            if kept.len() == FORWARDED_TAIL_LINES {
                kept.pop_front();
            }
        }
        kept.push_back(line);
    }

    let mut output = String::new();
    for line in kept {
        output.push_str(&line);
        output.push('\n');
    }
    Ok(output)
}

fn decode_line(buf: &[u8]) -> String {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

async fn join_output(task: JoinHandle<std::io::Result<String>>) -> Result<String> {
    task.await
        .map_err(|e| EngineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
        .map_err(EngineError::from)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let out = TokioRunner::new()
            .run("sh", &args(&["-c", "echo hello"]), CmdOptions::default())
            .await
            .unwrap();
        assert_eq!(out.stdout, "hello\n");
    }

    #[tokio::test]
    async fn test_run_feeds_stdin() {
        let out = TokioRunner::new()
            .run("sh", &args(&["-c", "cat"]), CmdOptions::stdin("s3cr3t"))
            .await
            .unwrap();
        assert_eq!(out.stdout, "s3cr3t\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_keeps_stderr() {
        let err = TokioRunner::new()
            .run("sh", &args(&["-c", "echo boom >&2; exit 3"]), CmdOptions::default())
            .await
            .unwrap_err();
        match err {
            EngineError::CommandFailed { command, code, stderr } => {
                assert_eq!(command, "sh -c echo boom >&2; exit 3");
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stream_forwards_both_pipes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let out = TokioRunner::new()
            .run(
                "sh",
                &args(&["-c", "echo out; echo err >&2"]),
                CmdOptions::stream(tx),
            )
            .await
            .unwrap();
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        lines.sort();
        assert_eq!(lines, vec!["err", "out"]);
    }

    #[tokio::test]
    async fn test_stream_tolerates_invalid_utf8() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        TokioRunner::new()
            .run(
                "sh",
                &args(&["-c", "echo step1; printf 'caf\\351\\n'; echo step3; exit 0"]),
                CmdOptions::stream(tx),
            )
            .await
            .unwrap();

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        assert_eq!(lines, vec!["step1", "caf\u{FFFD}", "step3"]);
    }

    #[tokio::test]
    async fn test_capture_tolerates_invalid_utf8() {
        let out = TokioRunner::new()
            .run("sh", &args(&["-c", "printf '\\377\\n'; exit 0"]), CmdOptions::default())
            .await
            .unwrap();
        assert_eq!(out.stdout, "\u{FFFD}\n");
    }

    #[tokio::test]
    async fn test_streamed_failure_keeps_stderr() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let err = TokioRunner::new()
            .run(
                "sh",
                &args(&["-c", "echo 'denied: requested access' >&2; exit 1"]),
                CmdOptions::stream(tx),
            )
            .await
            .unwrap_err();

        match err {
            EngineError::CommandFailed { stderr, .. } => {
                assert_eq!(stderr, "denied: requested access\n")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(rx.try_recv().unwrap(), "denied: requested access");
    }

    #[tokio::test]
    async fn test_streamed_output_keeps_only_tail() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let out = TokioRunner::new()
            .run(
                "sh",
                &args(&["-c", "i=0; while [ $i -lt 500 ]; do i=$((i+1)); echo $i; done"]),
                CmdOptions::stream(tx),
            )
            .await
            .unwrap();

        let kept: Vec<&str> = out.stdout.lines().collect();
        assert_eq!(kept.len(), FORWARDED_TAIL_LINES);
        assert_eq!(kept.first(), Some(&"301"));
        assert_eq!(kept.last(), Some(&"500"));

        let mut forwarded = 0;
        while rx.try_recv().is_ok() {
            forwarded += 1;
        }
        assert_eq!(forwarded, 500);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = TokioRunner::new()
            .run("imgops-definitely-missing", &[], CmdOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_cancel_kills_child() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = TokioRunner::new()
            .run_with_cancel(&token, "sleep", &args(&["30"]), CmdOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled { .. }));
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_deadline_kills_child() {
        let err = TokioRunner::with_timeout(Some(Duration::from_millis(50)))
            .run("sleep", &args(&["30"]), CmdOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout { .. }));
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline_applies_while_stdin_is_blocked() {
        // `sleep` never reads stdin, so a large input fills the pipe
        let input = "x".repeat(1 << 20);
        let started = std::time::Instant::now();
        let err = TokioRunner::with_timeout(Some(Duration::from_millis(100)))
            .run("sleep", &args(&["30"]), CmdOptions::stdin(input))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line(b"plain\n"), "plain");
        assert_eq!(decode_line(b"crlf\r\n"), "crlf");
        assert_eq!(decode_line(b"no newline"), "no newline");
        assert_eq!(decode_line(b"caf\xe9\n"), "caf\u{FFFD}");
    }

    #[test]
    fn test_command_line() {
        assert_eq!(
            command_line("docker", &args(&["push", "repo:v1"])),
            "docker push repo:v1"
        );
        assert_eq!(command_line("docker", &[]), "docker");
    }
}
