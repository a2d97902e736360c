//! Rebase state derived from git's on-disk metadata and command output.

use std::path::Path;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where a repository's rebase lifecycle stands.
///
/// `Complete` and `InProgress` are the only states git can be left in;
/// `Conflict` and `Aborted` label the outcome of a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebaseStatus {
    Complete,
    InProgress,
    Conflict,
    Aborted,
}

impl std::fmt::Display for RebaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Conflict => write!(f, "conflict"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Map the presence of git's rebase directories to a status.
pub fn status_from_metadata(rebase_merge_exists: bool, rebase_apply_exists: bool) -> RebaseStatus {
    if rebase_merge_exists || rebase_apply_exists {
        RebaseStatus::InProgress
    } else {
        RebaseStatus::Complete
    }
}

/// Step counters of a paused rebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseProgress {
    /// 1-based index of the step being applied.
    pub current: usize,
    pub total: usize,
}

/// Read the step counters from a `rebase-merge` (`msgnum`/`end`) or
/// `rebase-apply` (`next`/`last`) directory.
pub async fn read_progress(dir: &Path, current_file: &str, total_file: &str) -> Option<RebaseProgress> {
    let read = |name: &str| {
        let path = dir.join(name);
        async move {
            tokio::fs::read_to_string(&path)
                .await
                .ok()
                .and_then(|s| s.trim().parse::<usize>().ok())
        }
    };
    let current = read(current_file).await?;
    let total = read(total_file).await?;
    Some(RebaseProgress { current, total })
}

/// Number of `CONFLICT` lines in rebase output.
pub fn count_conflicts(output: &str) -> usize {
    output
        .split(['\n', '\r'])
        .filter(|line| line.trim_start().starts_with("CONFLICT"))
        .count()
}

fn progress_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Rebasing \((\d+)/(\d+)\)").ok())
        .as_ref()
}

/// Commits replayed, from `Rebasing (i/n)` markers.
///
/// Falls back to `1` for a bare "Successfully rebased" line and `0`
/// otherwise. Advisory only.
pub fn count_rebased_commits(output: &str) -> usize {
    let from_markers = progress_regex().and_then(|re| {
        re.captures_iter(output)
            .filter_map(|caps| caps.get(2)?.as_str().parse::<usize>().ok())
            .max()
    });
    if let Some(total) = from_markers {
        return total;
    }
    if output.to_ascii_lowercase().contains("successfully rebased") {
        debug!("no progress markers, assuming a single rebased commit");
        return 1;
    }
    0
}
