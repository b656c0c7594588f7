//! Scripted command execution for tests.
//!
//! Gated behind the `test-support` feature so that dependent crates can
//! drive fetch and build orchestration without spawning processes.

use crate::command::{CommandError, CommandExecutor, CommandSpec};
use std::collections::VecDeque;
use std::process::{ExitStatus, Output};
use std::sync::Mutex;

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.unsigned_abs())
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The program expected to be invoked (e.g., "git").
    pub program: String,
    /// The arguments expected on the invocation.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: Result<Output, CommandError>,
}

impl ExpectedCall {
    /// Build an expectation from string slices.
    #[must_use]
    pub fn new(program: &str, args: &[&str], result: Result<Output, CommandError>) -> Self {
        Self {
            program: program.to_owned(),
            args: args.iter().map(|&a| a.to_owned()).collect(),
            result,
        }
    }
}

/// A stub implementation of [`CommandExecutor`].
///
/// Records expected command invocations and returns predefined results in
/// order, panicking on any mismatch.
#[derive(Debug)]
pub struct StubExecutor {
    expected: Mutex<VecDeque<ExpectedCall>>,
    seen: Mutex<Vec<CommandSpec>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: Mutex::new(expected.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Return every command spec received so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock was poisoned by an earlier panic.
    #[must_use]
    pub fn seen(&self) -> Vec<CommandSpec> {
        self.seen.lock().expect("stub lock").clone()
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            self.expected.lock().expect("stub lock").is_empty(),
            "expected no further command invocations"
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, spec: &CommandSpec) -> Result<Output, CommandError> {
        self.seen.lock().expect("stub lock").push(spec.clone());
        let call = self
            .expected
            .lock()
            .expect("stub lock")
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected command invocation: {spec}"));

        assert_eq!(call.program, spec.program, "program mismatch for {spec}");
        assert_eq!(call.args, spec.args, "argument mismatch for {spec}");

        call.result
    }
}
