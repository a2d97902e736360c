//! The command runner: the only place a git subprocess is spawned.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::GitConfig;
use crate::errors::CommandError;

/// Captured result of one git invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code, `-1` when the process was killed by a signal.
    pub exit_code: i32,
}

impl CommandOutput {
    /// A successful output carrying `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// A failed output with the given exit code and `stderr`.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr; git splits progress and conflict notices
    /// across both streams.
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        out.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stdout.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&self.stderr);
        out
    }
}

/// Executes version-control subcommands against a repository path.
///
/// Implementations must not parse or retry: a command that runs and exits
/// non-zero is returned as `Ok` with its exit code, and `Err` is reserved for
/// failing to run the tool at all.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, repo: &Path, args: &[String]) -> Result<CommandOutput, CommandError>;
}

/// [`CommandRunner`] backed by the real `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: String,
    timeout: Duration,
}

impl GitCli {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn from_config(config: &GitConfig) -> Self {
        Self::new(config.binary.clone(), config.command_timeout())
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::from_config(&GitConfig::default())
    }
}

#[async_trait]
impl CommandRunner for GitCli {
    async fn run(&self, repo: &Path, args: &[String]) -> Result<CommandOutput, CommandError> {
        let mut cmd = Command::new(&self.binary);
        // Continuations must never wait on an editor, and output is parsed
        // in the C locale.
        cmd.current_dir(repo)
            .args(args)
            .env("GIT_EDITOR", "true")
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let command = args.join(" ");
        debug!(repo = %repo.display(), cmd = %format!("{} {}", self.binary, command), "running git command");

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CommandError::BinaryNotFound(self.binary.clone())
                } else {
                    CommandError::Io(e)
                }
            })?,
            Err(_) => {
                warn!(%command, secs = self.timeout.as_secs(), "git command timed out");
                return Err(CommandError::TimedOut {
                    command,
                    secs: self.timeout.as_secs(),
                });
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        if exit_code != 0 {
            debug!(%command, exit_code, "git command exited non-zero");
        }
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code,
        })
    }
}
