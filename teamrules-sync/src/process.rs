//! Process runner: the only place that spawns the version-control tool.
//!
//! Arguments are always handed over as a vector; nothing is ever composed
//! into a shell string.

use std::path::Path;
use std::process::Command;

use thiserror::Error;

/// Failure of a single subprocess invocation.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The binary could not be started at all (not installed, not executable).
    #[error("failed to spawn `{binary}`: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited non-zero (or was killed by a signal).
    #[error("`{binary} {}` failed ({}): {}", .args.join(" "), exit_label(.exit_code), .stderr.trim())]
    Failed {
        binary: String,
        args: Vec<String>,
        exit_code: Option<i32>,
        stderr: String,
    },
}

impl ProcessError {
    /// Captured stderr, when the process got far enough to produce any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ProcessError::Failed { stderr, .. } => Some(stderr),
            ProcessError::Spawn { .. } => None,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Capability to run one external command to completion.
///
/// Injected into the engine so tests can substitute a scripted fake.
pub trait ProcessRunner: Send + Sync {
    /// Run `binary args…` in `cwd`, returning stdout on a zero exit code.
    fn run(&self, cwd: &Path, binary: &str, args: &[&str]) -> Result<String, ProcessError>;
}

/// [`ProcessRunner`] backed by [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, cwd: &Path, binary: &str, args: &[&str]) -> Result<String, ProcessError> {
        tracing::debug!(cwd = %cwd.display(), command = %binary, ?args, "spawning");
        let output = Command::new(binary)
            .args(args)
            .current_dir(cwd)
            // Never block on a credential or editor prompt.
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_EDITOR", "true")
            // Status reads must not take `index.lock` from under a commit.
            .env("GIT_OPTIONAL_LOCKS", "0")
            .output()
            .map_err(|source| ProcessError::Spawn {
                binary: binary.to_string(),
                source,
            })?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        Err(ProcessError::Failed {
            binary: binary.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// A runner bound to the configured git binary.
#[derive(Clone, Copy)]
pub struct Git<'a> {
    runner: &'a dyn ProcessRunner,
    binary: &'a str,
}

impl<'a> Git<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, binary: &'a str) -> Self {
        Self { runner, binary }
    }

    /// Raw stdout of `git args…` run in `cwd`.
    pub fn run(&self, cwd: &Path, args: &[&str]) -> Result<String, ProcessError> {
        self.runner.run(cwd, self.binary, args)
    }

    /// Stdout with surrounding whitespace removed.
    pub fn run_trimmed(&self, cwd: &Path, args: &[&str]) -> Result<String, ProcessError> {
        self.run(cwd, args).map(|out| out.trim().to_string())
    }
}
