//! mergeflow core library.
//!
//! Branch integration on top of the git command line: predicting conflicts
//! between two branches before touching the working tree, running merges
//! with a chosen strategy, and driving a rebase through its
//! start/continue/skip/abort lifecycle.
//!
//! Every git invocation goes through a [`git::CommandRunner`], so the
//! orchestrators can be exercised against scripted output.

pub mod config;
pub mod conflict;
pub mod errors;
pub mod git;
pub mod merge;
pub mod rebase;

// Re-exports for convenience.
pub use config::MergeflowConfig;
pub use conflict::{ConflictDetector, ConflictReport, MergePreview};
pub use errors::{CoreError, IntegrationError};
pub use git::GitClient;
pub use merge::{MergeOptions, MergeOrchestrator, MergeResult, MergeStrategy};
pub use rebase::{RebaseOptions, RebaseOrchestrator, RebaseResult, RebaseStatus};
