//! Merge strategies and their mapping to `git merge` flags.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::IntegrationError;

/// How a merge is carried out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Only advance the branch pointer; refuse to create a merge commit.
    FastForward,
    /// git's default three-way strategy.
    #[default]
    Recursive,
    /// Record a merge but keep the target's tree.
    Ours,
    /// Three-way merge preferring the source side on conflicting hunks.
    Theirs,
    /// Merge more than one source at once.
    Octopus,
}

impl MergeStrategy {
    pub const ALL: [MergeStrategy; 5] = [
        Self::FastForward,
        Self::Recursive,
        Self::Ours,
        Self::Theirs,
        Self::Octopus,
    ];

    /// Strategy-specific `git merge` flags.
    pub fn args(self) -> &'static [&'static str] {
        match self {
            Self::FastForward => &["--ff-only"],
            Self::Recursive => &["-s", "recursive"],
            Self::Ours => &["-s", "ours"],
            Self::Theirs => &["-s", "recursive", "-X", "theirs"],
            Self::Octopus => &["-s", "octopus"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FastForward => "fast-forward",
            Self::Recursive => "recursive",
            Self::Ours => "ours",
            Self::Theirs => "theirs",
            Self::Octopus => "octopus",
        }
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = IntegrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == token)
            .ok_or_else(|| IntegrationError::InvalidStrategy {
                strategy: s.to_string(),
                detail: format!(
                    "expected one of: {}",
                    Self::ALL.map(MergeStrategy::as_str).join(", ")
                ),
            })
    }
}
