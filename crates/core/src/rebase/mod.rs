//! Rebase orchestration over the git CLI.

pub mod orchestrator;
pub mod progress;

pub use orchestrator::{build_rebase_args, RebaseOptions, RebaseOrchestrator, RebaseResult};
pub use progress::{
    count_conflicts, count_rebased_commits, status_from_metadata, RebaseProgress, RebaseStatus,
};
