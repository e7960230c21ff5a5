//! Synchronous-from-the-caller's-view execution of external commands.

use async_trait::async_trait;
use std::fmt::Debug;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{ChildHandle, CommandSpec, ConsoleMode, ExitOutcome, ManagedProcess};
use crate::cancellation::CancellationToken;
use crate::errors::ProcessError;

const STDERR_TAIL_CHARS: usize = 2_000;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Runs external commands.
///
/// Implementations never inspect the exit code to decide success; callers
/// check for the artifacts they expect instead.
#[async_trait]
pub trait ProcessRunner: Send + Sync + Debug {
    /// Runs `command` to completion and reports how it exited.
    ///
    /// Only a failure to start, a timeout, or a cancellation is an error.
    async fn run(&self, command: &CommandSpec) -> Result<ExitOutcome, ProcessError>;

    /// Starts `command` and hands ownership of the running process to the caller.
    async fn spawn(&self, command: &CommandSpec) -> Result<ManagedProcess, ProcessError>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
///
/// Commands run to completion get a null stdin and no console window.
/// Spawned processes lead their own process tree and get the console their
/// [`ConsoleMode`] asks for. Every child is killed if its owner drops it.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner {
    cancel: Option<Arc<CancellationToken>>,
}

impl TokioProcessRunner {
    /// Creates a runner whose waits cannot be cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a runner whose waits end when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(token: Arc<CancellationToken>) -> Self {
        Self {
            cancel: Some(token),
        }
    }

    fn command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ExitOutcome, ProcessError> {
        let program = spec.display_name();
        debug!(program = %program, args = ?spec.display_args(), "Running command");

        let mut cmd = Self::command(spec);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let started = Instant::now();
        let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            result = child.wait_with_output() => result.map_err(|source| ProcessError::Wait {
                program: program.clone(),
                source,
            })?,
            () = sleep_or_forever(spec.timeout) => {
                warn!(program = %program, "Command timed out; killing it");
                return Err(ProcessError::TimedOut {
                    program,
                    timeout: spec.timeout.unwrap_or_default(),
                });
            }
            () = cancelled_or_forever(self.cancel.as_deref()) => {
                let reason = self
                    .cancel
                    .as_ref()
                    .and_then(|t| t.reason())
                    .unwrap_or_else(|| "cancelled".to_string());
                warn!(program = %program, reason = %reason, "Command cancelled; killing it");
                return Err(ProcessError::Cancelled { program, reason });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit = ExitOutcome {
            code: output.status.code(),
            success: output.status.success(),
            elapsed: started.elapsed(),
            stderr_tail: tail_chars(stderr.trim_end(), STDERR_TAIL_CHARS).to_string(),
        };

        if exit.success {
            debug!(
                program = %program,
                elapsed_ms = exit.elapsed.as_millis() as u64,
                "Command finished"
            );
        } else {
            warn!(
                program = %program,
                code = ?exit.code,
                stderr = %exit.stderr_tail,
                "Command exited unsuccessfully"
            );
        }
        Ok(exit)
    }

    async fn spawn(&self, spec: &CommandSpec) -> Result<ManagedProcess, ProcessError> {
        let program = spec.display_name();
        debug!(
            program = %program,
            args = ?spec.display_args(),
            console = ?spec.console,
            "Spawning long-running command"
        );

        let mut cmd = Self::command(spec);
        match spec.console {
            ConsoleMode::Detached => {
                cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
                #[cfg(windows)]
                cmd.creation_flags(CREATE_NO_WINDOW);
            }
            // A unix child outside our process group may not read the terminal,
            // so console input reaches it through a pipe.
            ConsoleMode::Inherit if cfg!(unix) => {
                cmd.stdin(Stdio::piped()).stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            ConsoleMode::Inherit => {
                cmd.stdin(Stdio::inherit()).stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;
        if let Some(stdin) = child.stdin.take() {
            forward_console_input(stdin);
        }

        let handle = ChildHandle::process_tree(child, spec.shutdown_grace);
        let process = ManagedProcess::new(program, Box::new(handle));
        info!(process = %process.label(), pid = ?process.pid(), "Process started");
        Ok(process)
    }
}

/// Copies lines typed on our stdin to `stdin` until either side closes.
///
/// Reading happens on a plain thread so a pending read never holds up
/// runtime shutdown.
fn forward_console_input(mut stdin: ChildStdin) {
    let (tx, mut rx) = mpsc::channel::<String>(16);

    let spawned = std::thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "Could not start console input forwarding");
        return;
    }

    tokio::spawn(async move {
        while let Some(mut line) = rx.recv().await {
            line.push('\n');
            if stdin.write_all(line.as_bytes()).await.is_err() || stdin.flush().await.is_err() {
                debug!("Console input closed by the process");
                break;
            }
        }
    });
}

async fn sleep_or_forever(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

async fn cancelled_or_forever(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Last `max` characters of `s`, on a char boundary.
fn tail_chars(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        return s;
    }
    let skip = count - max;
    s.char_indices().nth(skip).map_or(s, |(idx, _)| &s[idx..])
}
