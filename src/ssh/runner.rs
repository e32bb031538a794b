//! External process execution

use std::ffi::OsString;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{PlakError, Result};

/// How an external process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStatus {
    pub success: bool,
    pub code: Option<i32>,
}

impl ProcessStatus {
    pub fn describe(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Captured result of a non-interactive process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub status: ProcessStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs (`ssh`, `ssh-keygen`, `sudo`)
pub trait ProcessRunner {
    /// Run to completion, capturing stdout and stderr
    fn output(&self, program: &str, args: &[OsString]) -> Result<ProcessOutput>;

    /// Run attached to the current terminal
    fn interactive(&self, program: &str, args: &[OsString]) -> Result<ProcessStatus>;
}

/// Runner backed by `std::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

fn spawn_error(program: &str, err: std::io::Error) -> PlakError {
    PlakError::Process {
        program: program.to_string(),
        message: format!("could not start: {err}"),
    }
}

fn status_of(status: std::process::ExitStatus) -> ProcessStatus {
    ProcessStatus {
        success: status.success(),
        code: status.code(),
    }
}

impl ProcessRunner for SystemRunner {
    fn output(&self, program: &str, args: &[OsString]) -> Result<ProcessOutput> {
        debug!(program, argc = args.len(), "running");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .output()
            .map_err(|e| spawn_error(program, e))?;

        Ok(ProcessOutput {
            status: status_of(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn interactive(&self, program: &str, args: &[OsString]) -> Result<ProcessStatus> {
        debug!(program, argc = args.len(), "running interactively");
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| spawn_error(program, e))?;
        Ok(status_of(status))
    }
}

/// Run `program` and turn a non-zero exit into `PlakError::Process`
pub fn run_checked(runner: &dyn ProcessRunner, program: &str, args: &[OsString]) -> Result<ProcessOutput> {
    let output = runner.output(program, args)?;
    if output.status.success {
        return Ok(output);
    }

    let stderr = output.stderr.trim();
    Err(PlakError::Process {
        program: program.to_string(),
        message: if stderr.is_empty() {
            output.status.describe()
        } else {
            stderr.to_string()
        },
    })
}
