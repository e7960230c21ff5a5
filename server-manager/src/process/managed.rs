//! Ownership of long-running child processes.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::process::Child;
use tracing::{info, warn};

use super::ExitOutcome;
use crate::cancellation::CancellationToken;

/// The operations the supervisor needs from a running process.
#[async_trait]
pub trait ProcessHandle: Send + std::fmt::Debug {
    /// OS process id, if still known.
    fn id(&self) -> Option<u32>;

    /// Waits for the process to exit.
    async fn wait(&mut self) -> std::io::Result<ExitOutcome>;

    /// Forcibly terminates the process and reaps it.
    async fn kill(&mut self) -> std::io::Result<()>;
}

/// A spawned tokio child and when it started.
///
/// A child spawned as a process-tree leader is stopped together with
/// everything it started: on unix it leads its own process group, which
/// receives SIGTERM and, after the grace period, SIGKILL; on Windows the
/// tree is terminated with `taskkill /T`.
#[derive(Debug)]
pub struct ChildHandle {
    child: Child,
    started: Instant,
    tree_grace: Option<Duration>,
}

impl ChildHandle {
    /// Wraps a freshly spawned child. Killing it kills only the child.
    #[must_use]
    pub fn new(child: Child) -> Self {
        Self {
            child,
            started: Instant::now(),
            tree_grace: None,
        }
    }

    /// Wraps a child spawned as the leader of its own process tree.
    #[must_use]
    pub fn process_tree(child: Child, grace: Duration) -> Self {
        Self {
            child,
            started: Instant::now(),
            tree_grace: Some(grace),
        }
    }
}

#[async_trait]
impl ProcessHandle for ChildHandle {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> std::io::Result<ExitOutcome> {
        let status = self.child.wait().await?;
        Ok(ExitOutcome {
            code: status.code(),
            success: status.success(),
            elapsed: self.started.elapsed(),
            stderr_tail: String::new(),
        })
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        match (self.tree_grace, self.child.id()) {
            (Some(grace), Some(pid)) => tree::terminate(&mut self.child, pid, grace).await,
            _ => self.child.kill().await,
        }
    }
}

#[cfg(unix)]
mod tree {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    use std::time::{Duration, Instant};
    use tokio::process::Child;

    use tracing::{debug, warn};

    const POLL_INTERVAL: Duration = Duration::from_millis(50);

    fn signal_group(group: Pid, signal: Option<Signal>) -> std::io::Result<bool> {
        match killpg(group, signal) {
            Ok(()) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub(super) async fn terminate(
        child: &mut Child,
        pid: u32,
        grace: Duration,
    ) -> std::io::Result<()> {
        let group = i32::try_from(pid)
            .map(Pid::from_raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let deadline = Instant::now() + grace;

        debug!(pgid = pid, "Sending SIGTERM to process group");
        signal_group(group, Some(Signal::SIGTERM))?;

        // The leader stays a zombie, and so keeps the group alive, until reaped.
        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
            while Instant::now() < deadline && signal_group(group, None)? {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }

        if signal_group(group, None)? {
            warn!(
                pgid = pid,
                grace_s = grace.as_secs(),
                "Process group outlived its grace period; killing it"
            );
            signal_group(group, Some(Signal::SIGKILL))?;
        }
        child.wait().await.map(|_| ())
    }
}

#[cfg(windows)]
mod tree {
    use std::process::Stdio;
    use std::time::Duration;
    use tokio::process::{Child, Command};

    use tracing::{debug, warn};

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;

    pub(super) async fn terminate(
        child: &mut Child,
        pid: u32,
        grace: Duration,
    ) -> std::io::Result<()> {
        debug!(pid, "Terminating process tree");
        let status = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .creation_flags(CREATE_NO_WINDOW)
            .status()
            .await?;
        if !status.success() {
            warn!(pid, code = ?status.code(), "taskkill failed; killing the leader only");
            child.start_kill()?;
        }
        if tokio::time::timeout(grace, child.wait()).await.is_err() {
            child.kill().await?;
        }
        Ok(())
    }
}

/// One externally spawned process, owned by whoever holds this value.
///
/// The handle is released when [`ManagedProcess::wait`] or
/// [`ManagedProcess::shutdown`] returns, or when the value is dropped.
#[derive(Debug)]
pub struct ManagedProcess {
    label: String,
    pid: Option<u32>,
    handle: Box<dyn ProcessHandle>,
}

impl ManagedProcess {
    /// Takes ownership of a process handle.
    #[must_use]
    pub fn new(label: impl Into<String>, handle: Box<dyn ProcessHandle>) -> Self {
        let pid = handle.id();
        Self {
            label: label.into(),
            pid,
            handle,
        }
    }

    /// Name used in logs.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Process id captured at spawn time.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Waits for the process to exit on its own and releases it.
    pub async fn wait(mut self) -> std::io::Result<ExitOutcome> {
        let outcome = self.handle.wait().await;
        match &outcome {
            Ok(exit) => info!(process = %self.label, code = ?exit.code, "{} exited", self.label),
            Err(e) => warn!(process = %self.label, error = %e, "Failed waiting for {}", self.label),
        }
        outcome
    }

    /// Kills the process and releases it.
    pub async fn shutdown(mut self) -> std::io::Result<()> {
        info!(process = %self.label, pid = ?self.pid, "Stopping {}", self.label);
        self.handle.kill().await
    }

    /// Waits for exit, or shuts the process down once `token` is cancelled.
    ///
    /// Returns `None` when the process was stopped by cancellation.
    pub async fn supervise(
        mut self,
        token: &CancellationToken,
    ) -> std::io::Result<Option<ExitOutcome>> {
        let exited = tokio::select! {
            outcome = self.handle.wait() => Some(outcome?),
            () = token.cancelled() => None,
        };

        if let Some(exit) = exited {
            info!(
                process = %self.label,
                code = ?exit.code,
                elapsed_s = exit.elapsed.as_secs(),
                "{} exited",
                self.label
            );
            return Ok(Some(exit));
        }

        info!(
            process = %self.label,
            reason = %token.reason().unwrap_or_default(),
            "Cancellation requested"
        );
        self.shutdown().await?;
        Ok(None)
    }
}
