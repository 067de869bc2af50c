//! Test support utilities for imgops-engine
//!
//! Provides a `FakeRunner` that records every invocation and replays scripted
//! outcomes, so `EngineClient` can be tested without a real engine.

use crate::{CmdOptions, CmdOutput, CommandRunner, EngineClient, EngineError, Result};
use async_trait::async_trait;
use imgops_config::HostEnv;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// One recorded call to the runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub cancellable: bool,
}

/// What the fake does when invoked
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    /// Exit 0. `lines` go to the output sink when one is attached and are
    /// appended to `stdout`.
    Success { stdout: String, lines: Vec<String> },
    /// Exit with `code`; `stderr` lines are forwarded like real output
    Failure { code: i32, stderr: String },
    /// Block until cancelled
    Hang,
}

impl FakeOutcome {
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self::Success {
            stdout: stdout.into(),
            lines: Vec::new(),
        }
    }

    pub fn lines(lines: &[&str]) -> Self {
        Self::Success {
            stdout: String::new(),
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self::Failure {
            code,
            stderr: stderr.into(),
        }
    }
}

/// Scriptable [`CommandRunner`]
#[derive(Clone, Default)]
pub struct FakeRunner {
    pub calls: Arc<Mutex<Vec<Invocation>>>,
    script: Arc<Mutex<VecDeque<FakeOutcome>>>,
}

impl FakeRunner {
    /// Every call succeeds with empty output unless scripted otherwise
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next unscripted call
    pub fn then(self, outcome: FakeOutcome) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Arguments of every recorded call
    pub fn get_args(&self) -> Vec<Vec<String>> {
        self.get_calls().into_iter().map(|c| c.args).collect()
    }

    fn record(&self, cancellable: bool, program: &str, args: &[String], opts: &CmdOptions) -> FakeOutcome {
        self.calls.lock().unwrap().push(Invocation {
            program: program.to_string(),
            args: args.to_vec(),
            stdin: opts.stdin.clone(),
            cancellable,
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| FakeOutcome::stdout(""))
    }

    // Like the real runner, forwarded lines are also kept in the output.
    fn finish(program: &str, args: &[String], outcome: FakeOutcome, opts: CmdOptions) -> Result<CmdOutput> {
        match outcome {
            FakeOutcome::Success { mut stdout, lines } => {
                for line in lines {
                    if let Some(ref tx) = opts.output {
                        let _ = tx.send(line.clone());
                    }
                    stdout.push_str(&line);
                    stdout.push('\n');
                }
                Ok(CmdOutput {
                    stdout,
                    stderr: String::new(),
                })
            }
            FakeOutcome::Failure { code, stderr } => {
                if let Some(ref tx) = opts.output {
                    for line in stderr.lines() {
                        let _ = tx.send(line.to_string());
                    }
                }
                Err(EngineError::CommandFailed {
                    command: crate::command_line(program, args),
                    code: Some(code),
                    stderr,
                })
            }
            FakeOutcome::Hang => Err(EngineError::Cancelled {
                program: program.to_string(),
            }),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[String], opts: CmdOptions) -> Result<CmdOutput> {
        let outcome = self.record(false, program, args, &opts);
        Self::finish(program, args, outcome, opts)
    }

    async fn run_with_cancel(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[String],
        opts: CmdOptions,
    ) -> Result<CmdOutput> {
        let outcome = self.record(true, program, args, &opts);
        if matches!(outcome, FakeOutcome::Hang) {
            cancel.cancelled().await;
        } else if cancel.is_cancelled() {
            return Err(EngineError::Cancelled {
                program: program.to_string(),
            });
        }
        Self::finish(program, args, outcome, opts)
    }
}

/// Host environment with a fixed home directory and variables
pub fn fake_host(home: Option<PathBuf>, vars: &[(&str, &str)]) -> HostEnv {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    HostEnv::with_vars(home, vars)
}

/// `EngineClient` over `runner` with default settings
pub fn fake_client(runner: &FakeRunner, host: HostEnv) -> EngineClient {
    EngineClient::new(Arc::new(runner.clone()), host)
}
