//! Execution of external control-plane commands.
//!
//! Everything that shells out goes through [`CommandRunner`] so callers can
//! be exercised against scripted `(stdout, stderr, exit code)` results.

use super::error::CommandError;
use anyhow::{Context, Result};
use std::io::Write;
use std::process::Command;

/// One finished external process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub argv: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandInvocation {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Shell-escaped command line, for logs and error messages.
    pub fn command_line(&self) -> String {
        command_line(&self.argv)
    }

    pub fn ensure_success(self) -> Result<Self, CommandError> {
        if self.success() {
            Ok(self)
        } else {
            Err(CommandError::new(
                self.command_line(),
                self.exit_code,
                &self.stderr,
            ))
        }
    }
}

pub fn command_line(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| shell_escape::escape(arg.as_str().into()).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs one external process and captures its output.
///
/// Implementations must not retry and must not interpret the exit code.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    fn run(&self, argv: &[String]) -> Result<CommandInvocation>;
}

/// Runs commands as real subprocesses.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, argv: &[String]) -> Result<CommandInvocation> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("Cannot run an empty command"))?;

        tracing::debug!("Running: {}", command_line(argv));
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to spawn `{program}`"))?;

        let invocation = CommandInvocation {
            argv: argv.to_vec(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            // Killed by a signal
            exit_code: output.status.code().unwrap_or(-1),
        };
        tracing::debug!(
            "`{}` exited with status {}",
            program,
            invocation.exit_code
        );
        Ok(invocation)
    }
}

/// Run `argv` with `payload` written to a temporary file whose path is
/// appended as the final argument.
///
/// The file is removed when this returns, whether or not the command ran.
pub fn execute_with_payload(
    runner: &dyn CommandRunner,
    argv: &[String],
    payload: &str,
) -> Result<CommandInvocation> {
    let mut file = tempfile::Builder::new()
        .prefix("benchforge-")
        .suffix(".json")
        .tempfile()
        .context("Failed to create temporary payload file")?;
    file.write_all(payload.as_bytes())
        .and_then(|_| file.flush())
        .context("Failed to write temporary payload file")?;

    let path = file
        .path()
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Temporary file path is not valid UTF-8"))?
        .to_string();

    let mut full_argv = argv.to_vec();
    full_argv.push(path);
    runner.run(&full_argv)
}
