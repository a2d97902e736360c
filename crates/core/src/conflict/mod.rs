//! Conflict prediction.
//!
//! The conflict subsystem is responsible for:
//! 1. **Classification** -- intersecting two change sets taken against a
//!    common merge base and typing every overlap.
//! 2. **Scoring** -- rolling the overlaps up into a [`ConflictReport`] with a
//!    [`Difficulty`] rating.
//! 3. **Previewing** -- adding fast-forward and change-count hints for merge
//!    front ends.

pub mod detector;
pub mod report;

pub use detector::{find_conflicts, Conflict, ConflictDetector, ConflictType, Severity};
pub use report::{ConflictReport, Difficulty, MergePreview};
