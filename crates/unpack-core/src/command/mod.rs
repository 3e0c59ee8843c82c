//! External tool invocation.
//!
//! Every subprocess goes through a [`CommandRunner`] so strategies and the
//! disk-image mount manager can be exercised with scripted output in tests.
//! [`SystemRunner`] is the real implementation.

mod path_env;
mod runner;

pub use path_env::SearchPath;
pub use runner::SystemRunner;

use std::ffi::OsString;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use crate::Result;
use crate::UnpackError;
use crate::strategy::StrategyKind;

/// A fully described subprocess invocation.
///
/// Built with a chained API in the same shape as `std::process::Command`,
/// but inspectable so tests can assert on what would have run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Vec<(OsString, OsString)>,
    input: Option<Vec<u8>>,
    search_dirs: Vec<PathBuf>,
    timeout: Option<Duration>,
}

impl ToolCommand {
    /// Creates a command for `program`, resolved through `PATH`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            input: None,
            search_dirs: Vec::new(),
            timeout: None,
        }
    }

    /// Appends an argument.
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

    /// Runs the command with `dir` as its working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Sets an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Writes `input` to the child's standard input, then closes it.
    #[must_use]
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Prepends `dirs` to the child's `PATH`, ahead of the ambient search
    /// path.
    #[must_use]
    pub fn search_dirs<I>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.search_dirs.extend(dirs);
        self
    }

    /// Kills the child if it runs longer than `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the arguments.
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Returns the working directory, if set.
    pub fn get_current_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Returns the explicit environment overrides.
    pub fn get_envs(&self) -> &[(OsString, OsString)] {
        &self.env
    }

    /// Returns the standard input payload, if any.
    pub fn get_stdin(&self) -> Option<&[u8]> {
        self.input.as_deref()
    }

    /// Returns the tool directories that take precedence over `PATH`.
    pub fn get_search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Returns the timeout, if set.
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Renders the command line for logs and error messages.
    pub fn display(&self) -> String {
        let mut rendered = self.program.clone();
        for arg in &self.args {
            rendered.push(' ');
            let arg = arg.to_string_lossy();
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                rendered.push('\'');
                rendered.push_str(&arg);
                rendered.push('\'');
            } else {
                rendered.push_str(&arg);
            }
        }
        rendered
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the child was terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Builds an output from a real exit status.
    pub fn from_status(status: ExitStatus, stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            code: status.code(),
            stdout,
            stderr,
        }
    }

    /// A successful output with the given standard output.
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// A failed output with the given exit code and standard error.
    pub fn failure(code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            code: Some(code),
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns `true` if the process exited with status zero.
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Standard output decoded lossily as UTF-8.
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error decoded lossily as UTF-8.
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Describes the exit status for error messages.
    pub fn status_description(&self) -> String {
        self.code.map_or_else(
            || "terminated by signal".to_string(),
            |code| format!("exit status: {code}"),
        )
    }

    /// Converts a non-zero exit into [`UnpackError::Tool`].
    pub fn check(self, strategy: StrategyKind, command: &ToolCommand) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(UnpackError::Tool {
            strategy,
            command: command.display(),
            status: self.status_description(),
            stderr: self.stderr_lossy(),
        })
    }
}

/// Executes [`ToolCommand`]s.
///
/// Implementations block until the child exits (or its timeout elapses).
/// A non-zero exit is *not* an error at this level; callers decide via
/// [`CommandOutput::check`].
pub trait CommandRunner: Send + Sync {
    /// Runs `command` and captures its output.
    ///
    /// # Errors
    ///
    /// Returns [`UnpackError::ToolNotFound`] if the program cannot be
    /// spawned and [`UnpackError::Timeout`] if it outlives its timeout.
    fn run(&self, command: &ToolCommand) -> Result<CommandOutput>;

    /// Runs `command` and fails unless it exits successfully.
    fn run_checked(&self, strategy: StrategyKind, command: &ToolCommand) -> Result<CommandOutput> {
        self.run(command)?.check(strategy, command)
    }
}
