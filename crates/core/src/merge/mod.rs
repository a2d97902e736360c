//! Merge strategy execution.

pub mod orchestrator;
pub mod stats;
pub mod strategy;

pub use orchestrator::{
    build_merge_args, MergeOptions, MergeOrchestrator, MergeOutcome, MergeResult,
    ALREADY_UP_TO_DATE,
};
pub use stats::{parse_merge_stats, MergeStats};
pub use strategy::MergeStrategy;
