//! Argument-vector command descriptions and exit outcomes.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

/// Time a long-running process gets to exit after it is asked to stop.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// What a spawned long-running process is attached to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsoleMode {
    /// No console: standard streams are discarded.
    #[default]
    Detached,
    /// Shares this process's console: output goes to our stdout and stderr,
    /// and console input is forwarded to the process.
    Inherit,
}

/// An external command as a program plus discrete arguments.
///
/// Arguments are passed to the OS as-is; nothing is interpreted by a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments, one element per argv entry.
    pub args: Vec<OsString>,
    /// Working directory; inherits the caller's when `None`.
    pub working_dir: Option<PathBuf>,
    /// Maximum time to wait for exit.
    pub timeout: Option<Duration>,
    /// Console attachment when spawned as a long-running process.
    pub console: ConsoleMode,
    /// Time between the stop request and the forced kill on shutdown.
    pub shutdown_grace: Duration,
}

impl CommandSpec {
    /// Creates a command with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: None,
            console: ConsoleMode::Detached,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the console attachment.
    #[must_use]
    pub fn console(mut self, console: ConsoleMode) -> Self {
        self.console = console;
        self
    }

    /// Sets the shutdown grace period.
    #[must_use]
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Short name used in logs.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// The arguments rendered lossily for logs.
    #[must_use]
    pub fn display_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Builds the command that starts the server script through the platform
    /// command interpreter, running from the script's own directory and
    /// attached to this process's console.
    #[must_use]
    pub fn server_script(script: &Path) -> Self {
        let file_name = script
            .file_name()
            .map_or_else(|| script.as_os_str().to_owned(), ToOwned::to_owned);
        let command = if cfg!(windows) {
            Self::new("cmd.exe").arg("/c").arg(file_name)
        } else {
            Self::new("sh").arg(file_name)
        }
        .console(ConsoleMode::Inherit);

        match script.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => command.current_dir(dir),
            None => command,
        }
    }
}

/// How a finished process exited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitOutcome {
    /// Exit code, absent when the process was terminated by a signal.
    pub code: Option<i32>,
    /// Whether the exit status reported success.
    pub success: bool,
    /// Wall-clock time between spawn and exit.
    pub elapsed: Duration,
    /// Tail of the process's standard error.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr_tail: String,
}

impl ExitOutcome {
    /// A successful exit with code zero.
    #[must_use]
    pub fn ok(elapsed: Duration) -> Self {
        Self {
            code: Some(0),
            success: true,
            elapsed,
            stderr_tail: String::new(),
        }
    }

    /// A failed exit with the given code.
    #[must_use]
    pub fn failed(code: i32, elapsed: Duration) -> Self {
        Self {
            code: Some(code),
            success: false,
            elapsed,
            stderr_tail: String::new(),
        }
    }
}
