//! External process execution with timeouts.
//!
//! Every external tool the pipeline drives (git, the Swift build tool,
//! ranlib) is invoked through [`CommandExecutor`] so that orchestration
//! code can be exercised with scripted responses instead of real
//! processes. The system implementation enforces a per-command timeout and
//! kills the child when it expires, which is the only cancellation point
//! the pipeline offers.

use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use wait_timeout::ChildExt;

/// Errors arising from running an external command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program could not be started (usually missing from `PATH`).
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The command did not finish within its time limit and was killed.
    #[error("`{command}` timed out after {seconds} seconds")]
    TimedOut {
        /// The rendered command line.
        command: String,
        /// The timeout that expired.
        seconds: u64,
    },

    /// The command ran but exited unsuccessfully.
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        /// The rendered command line.
        command: String,
        /// The exit status description.
        status: String,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// Waiting for or reading from the child failed.
    #[error("I/O error while running `{command}`: {source}")]
    Io {
        /// The rendered command line.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A fully described external command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSpec {
    /// Program name or path.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Working directory, if different from the caller's.
    pub current_dir: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Maximum run time before the child is killed.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    /// Create a command for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Append a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the command from `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Limit how long the command may run.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Abstraction for running external commands.
///
/// Implementations must be shareable across threads so that the two
/// architecture builds can run concurrently.
pub trait CommandExecutor: Send + Sync {
    /// Run the command and return its captured output.
    ///
    /// A non-zero exit status is *not* an error at this level; use
    /// [`run_checked`] when failure should abort.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when the command cannot be started, times
    /// out, or its output cannot be collected.
    fn run(&self, spec: &CommandSpec) -> Result<Output, CommandError>;
}

/// Run a command and turn a non-zero exit status into
/// [`CommandError::Failed`].
///
/// # Errors
///
/// Propagates executor errors and reports unsuccessful exits.
pub fn run_checked(
    executor: &dyn CommandExecutor,
    spec: &CommandSpec,
) -> Result<Output, CommandError> {
    log::debug!("running {spec}");
    let output = executor.run(spec)?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(CommandError::Failed {
            command: spec.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, spec: &CommandSpec) -> Result<Output, CommandError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        // Drain both pipes on their own threads so a chatty child cannot
        // block on a full pipe while we wait for it.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = wait_for(&mut child, spec)?;

        Ok(Output {
            status,
            stdout: join_drain(stdout),
            stderr: join_drain(stderr),
        })
    }
}

/// Wait for the child, honouring the optional timeout.
fn wait_for(child: &mut Child, spec: &CommandSpec) -> Result<ExitStatus, CommandError> {
    let io_error = |source| CommandError::Io {
        command: spec.to_string(),
        source,
    };

    let Some(timeout) = spec.timeout else {
        return child.wait().map_err(io_error);
    };

    if let Some(status) = child.wait_timeout(timeout).map_err(io_error)? {
        return Ok(status);
    }

    // Timeout: kill the process and reap it.
    let _ = child.kill();
    let _ = child.wait();
    Err(CommandError::TimedOut {
        command: spec.to_string(),
        seconds: timeout.as_secs(),
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut reader| {
        std::thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = reader.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
