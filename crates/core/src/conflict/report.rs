//! Conflict reports, difficulty scoring and merge previews.

use serde::{Deserialize, Serialize};

use super::detector::Conflict;

/// Reports with more conflicts than this are `Hard`.
const MEDIUM_CONFLICT_LIMIT: usize = 5;

/// How hard an integration is expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Trivial,
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Score a conflict set. The all-auto-resolvable check runs before the
    /// count threshold, so six renames to identical targets are `Easy`.
    pub fn score(total_conflicts: usize, can_auto_resolve: usize) -> Self {
        if total_conflicts == 0 {
            Self::Trivial
        } else if can_auto_resolve == total_conflicts {
            Self::Easy
        } else if total_conflicts <= MEDIUM_CONFLICT_LIMIT {
            Self::Medium
        } else {
            Self::Hard
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trivial => write!(f, "trivial"),
            Self::Easy => write!(f, "easy"),
            Self::Medium => write!(f, "medium"),
            Self::Hard => write!(f, "hard"),
        }
    }
}

/// Predicted conflicts of merging `source` into `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub source: String,
    pub target: String,
    pub merge_base: String,
    pub total_conflicts: usize,
    pub conflicts: Vec<Conflict>,
    /// How many of `conflicts` are auto-resolvable.
    pub can_auto_resolve: usize,
    pub difficulty: Difficulty,
}

impl ConflictReport {
    /// Build a report; the counts and difficulty are derived from
    /// `conflicts` so they can never disagree with it.
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        merge_base: impl Into<String>,
        conflicts: Vec<Conflict>,
    ) -> Self {
        let total_conflicts = conflicts.len();
        let can_auto_resolve = conflicts.iter().filter(|c| c.auto_resolvable).count();
        Self {
            source: source.into(),
            target: target.into(),
            merge_base: merge_base.into(),
            total_conflicts,
            conflicts,
            can_auto_resolve,
            difficulty: Difficulty::score(total_conflicts, can_auto_resolve),
        }
    }

    pub fn has_conflicts(&self) -> bool {
        self.total_conflicts > 0
    }

    /// Paths of every conflict, in report order.
    pub fn conflicted_paths(&self) -> Vec<String> {
        self.conflicts.iter().map(|c| c.file_path.clone()).collect()
    }
}

/// A [`ConflictReport`] plus what the merge would bring in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePreview {
    #[serde(flatten)]
    pub report: ConflictReport,
    pub can_fast_forward: bool,
    /// Files added (or copied) on the source side since the merge base.
    pub files_added: usize,
    /// Files modified (or renamed) on the source side.
    pub files_changed: usize,
    /// Files deleted on the source side.
    pub files_deleted: usize,
}
