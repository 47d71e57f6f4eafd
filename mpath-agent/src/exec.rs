//! Command execution for the external tools the agent drives.
//!
//! Every shell-out (`pvesm`, `iscsiadm`, `multipath`, `apt-get`,
//! `systemctl`, `scsi_id`) goes through a [`CommandRunner`] so the
//! orchestration can be exercised without touching the host.

use std::io;
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status was zero
    pub success: bool,
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed output with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// A command exited non-zero.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{context} failed: {stderr}")]
pub struct CommandFailure {
    pub context: String,
    pub stderr: String,
}

/// Check command output for success or return a [`CommandFailure`].
pub fn check_command_result(output: &CommandOutput, context: &str) -> Result<(), CommandFailure> {
    if output.success {
        return Ok(());
    }

    let stderr = output.stderr.trim();
    let stderr = if stderr.is_empty() {
        match output.code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    } else {
        stderr.to_string()
    };

    Err(CommandFailure {
        context: context.to_string(),
        stderr,
    })
}

/// Executes external programs.
pub trait CommandRunner {
    /// Run `program` with `args` to completion and capture its output.
    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput>;

    /// True when commands are only reported, never executed.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Runs commands on the host via `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        debug!(program, ?args, "Executing command");

        let output = Command::new(program).args(args).output()?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Logs commands instead of executing them.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunRunner;

impl CommandRunner for DryRunRunner {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        info!("[dry-run] {} {}", program, args.join(" "));
        Ok(CommandOutput::ok(""))
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
