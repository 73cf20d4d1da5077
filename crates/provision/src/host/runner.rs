//! Process execution behind a trait so host logic can be tested without a
//! real docker or git.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use super::HostError;

/// A command line to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory; the current one when `None`.
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// A command with arguments.
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    /// Run from `dir`.
    #[must_use]
    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
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

/// Captured result of a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Exit status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Executes commands on the host.
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output.
    ///
    /// # Errors
    /// Returns [`HostError::Spawn`] if the program cannot be started.
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, HostError>;

    /// Whether `program` is on `PATH`.
    fn is_installed(&self, program: &str) -> bool;

    /// Run a command and fail on a non-zero exit.
    ///
    /// # Errors
    /// Returns [`HostError::CommandFailed`] on a non-zero exit.
    fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput, HostError> {
        let output = self.run(spec)?;
        if output.success() {
            Ok(output)
        } else {
            Err(HostError::CommandFailed {
                command: spec.to_string(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs commands with [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, HostError> {
        debug!(command = %spec, cwd = ?spec.cwd, "Running");

        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|source| HostError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn is_installed(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}
