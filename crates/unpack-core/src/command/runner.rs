//! Subprocess execution backed by `std::process`.

use std::io::Read;
use std::io::Write;
use std::process::Child;
use std::process::Command;
use std::process::Stdio;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use tracing::debug;

use super::CommandOutput;
use super::CommandRunner;
use super::SearchPath;
use super::ToolCommand;
use crate::Result;
use crate::UnpackError;

/// Poll interval while waiting on a child with a timeout.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs commands as real child processes.
///
/// Standard output and standard error are drained on helper threads so a
/// chatty child can never block on a full pipe while we wait for it.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    ambient: Option<SearchPath>,
}

impl SystemRunner {
    /// Creates a runner that reads the ambient `PATH` at each invocation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a runner with a fixed base search path instead of the
    /// process's `PATH`.
    pub fn with_search_path(path: SearchPath) -> Self {
        Self {
            ambient: Some(path),
        }
    }

    fn build(&self, command: &ToolCommand) -> Command {
        let mut cmd = Command::new(command.program());
        cmd.args(command.get_args());

        if let Some(dir) = command.get_current_dir() {
            cmd.current_dir(dir);
        }

        if !command.get_search_dirs().is_empty() {
            let base = self.ambient.clone().unwrap_or_else(SearchPath::ambient);
            let path = base.prepend_all(command.get_search_dirs());
            cmd.env("PATH", path.to_os_string());
        }

        for (key, value) in command.get_envs() {
            cmd.env(key, value);
        }

        cmd.stdin(if command.get_stdin().is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, command: &ToolCommand) -> Result<CommandOutput> {
        debug!(command = %command.display(), cwd = ?command.get_current_dir(), "spawning");

        let mut child = self
            .build(command)
            .spawn()
            .map_err(|source| UnpackError::ToolNotFound {
                tool: command.program().to_string(),
                source,
            })?;

        if let (Some(input), Some(mut stdin)) = (command.get_stdin(), child.stdin.take()) {
            // A child that exits without reading its input closes the pipe;
            // that is not a failure of ours.
            if let Err(e) = stdin.write_all(input)
                && e.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(e.into());
            }
        }

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match command.get_timeout() {
            Some(timeout) => match wait_with_deadline(&mut child, timeout)? {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(UnpackError::Timeout {
                        command: command.display(),
                        timeout,
                    });
                }
            },
            None => child.wait()?,
        };

        let output = CommandOutput::from_status(status, join(stdout)?, join(stderr)?);
        debug!(
            command = %command.display(),
            status = %output.status_description(),
            "finished"
        );
        Ok(output)
    }
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> Option<JoinHandle<std::io::Result<Vec<u8>>>> {
    source.map(|mut reader| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

fn join(handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Result<Vec<u8>> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| std::io::Error::other("output reader thread panicked"))?
            .map_err(UnpackError::from),
        None => Ok(Vec::new()),
    }
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}
