//! Error types for the mergeflow core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Integration(#[from] IntegrationError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Command runner errors
// ---------------------------------------------------------------------------

/// Failures to invoke the version-control binary at all.
///
/// A command that runs and exits non-zero is *not* a `CommandError`; the
/// runner hands the exit status back to the caller to interpret.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The binary was not found on `$PATH`.
    #[error("git binary not found: {0}")]
    BinaryNotFound(String),

    /// The command exceeded the configured timeout and was killed.
    #[error("git command `{command}` timed out after {secs}s")]
    TimedOut { command: String, secs: u64 },

    /// Generic I/O wrapper (spawn failure, broken pipe, ...).
    #[error("git I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Integration errors
// ---------------------------------------------------------------------------

/// Errors from change extraction, conflict detection and the merge/rebase
/// orchestrators.
#[derive(Debug, Error)]
pub enum IntegrationError {
    /// A branch or ref name was empty.
    #[error("invalid branch name: '{0}'")]
    InvalidBranch(String),

    /// A ref does not resolve to a commit.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// The two refs share no history.
    #[error("no merge base between '{source_ref}' and '{target_ref}'")]
    NoMergeBase {
        source_ref: String,
        target_ref: String,
    },

    /// The working tree has uncommitted changes.
    #[error("working tree has uncommitted changes")]
    DirtyWorkingTree,

    /// Unknown strategy token, or a strategy used with the wrong arguments.
    #[error("invalid merge strategy '{strategy}': {detail}")]
    InvalidStrategy { strategy: String, detail: String },

    /// A rebase is already paused in this repository.
    #[error("a rebase is already in progress")]
    RebaseInProgress,

    /// A continuation command was issued with no rebase active.
    #[error("no rebase in progress")]
    NoRebaseInProgress,

    /// None of branch / onto / upstream was supplied.
    #[error("rebase requires a branch, an --onto ref or an upstream")]
    MissingRebaseTarget,

    /// `merge --abort` was issued with no merge active.
    #[error("no merge in progress")]
    NoMergeInProgress,

    /// The merge stopped on conflicts.
    #[error("merge conflict in {} file(s): {}", .files.len(), .files.join(", "))]
    MergeConflict { files: Vec<String> },

    /// The tool could not be run, or a command that must succeed failed.
    #[error("git {command} failed: {detail}")]
    ExecutionFailed { command: String, detail: String },
}

impl IntegrationError {
    /// Build an [`IntegrationError::ExecutionFailed`] for `args`.
    pub fn execution_failed(args: &[String], detail: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            command: args.join(" "),
            detail: detail.into(),
        }
    }

    /// Wrap a runner failure for the command `args`.
    pub fn from_command(args: &[String], err: CommandError) -> Self {
        Self::execution_failed(args, err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
