//! Scraping file and line counts from git's diffstat summary line.

use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Counts from a ` N files changed, X insertions(+), Y deletions(-)` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    pub files_changed: usize,
    pub additions: usize,
    pub deletions: usize,
}

fn summary_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(\d+) files? changed(?:, (\d+) insertions?\(\+\))?(?:, (\d+) deletions?\(-\))?",
        )
        .ok()
    })
    .as_ref()
}

/// Extract stats from merge output. Anything missing counts as zero.
pub fn parse_merge_stats(output: &str) -> MergeStats {
    let Some(re) = summary_regex() else {
        return MergeStats::default();
    };
    let Some(caps) = output.lines().rev().find_map(|line| re.captures(line)) else {
        debug!("no diffstat summary in merge output");
        return MergeStats::default();
    };
    let count = |i: usize| {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .unwrap_or(0)
    };
    MergeStats {
        files_changed: count(1),
        additions: count(2),
        deletions: count(3),
    }
}
