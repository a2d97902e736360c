//! Change-set extraction: `git diff --name-status` turned into typed changes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::client::GitClient;
use crate::errors::IntegrationError;

/// Kind of change to a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed { from: String },
    Copied { from: String },
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Deleted => write!(f, "deleted"),
            Self::Renamed { .. } => write!(f, "renamed"),
            Self::Copied { .. } => write!(f, "copied"),
        }
    }
}

/// One file touched between two commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Path after the change (the new path for renames and copies).
    pub path: String,
    pub kind: ChangeKind,
    /// Set by [`GitClient::changes_with_binary`]; always `false` otherwise.
    #[serde(default)]
    pub is_binary: bool,
}

impl FileChange {
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            is_binary: false,
        }
    }

    /// The source path of a rename or copy.
    pub fn old_path(&self) -> Option<&str> {
        match &self.kind {
            ChangeKind::Renamed { from } | ChangeKind::Copied { from } => Some(from),
            _ => None,
        }
    }
}

impl GitClient {
    /// Files changed between `from` and `to`.
    #[instrument(skip(self))]
    pub async fn changes(&self, from: &str, to: &str) -> Result<Vec<FileChange>, IntegrationError> {
        let range = format!("{from}..{to}");
        let stdout = self.run_checked(&["diff", "--name-status", &range]).await?;
        let changes = parse_name_status(&stdout);
        debug!(count = changes.len(), %range, "extracted change set");
        Ok(changes)
    }

    /// Like [`changes`](Self::changes), with binary files flagged from
    /// `--numstat`. A numstat failure leaves every change marked as text.
    pub async fn changes_with_binary(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Vec<FileChange>, IntegrationError> {
        let mut changes = self.changes(from, to).await?;
        let range = format!("{from}..{to}");
        match self
            .run_checked(&["diff", "--numstat", "--no-renames", &range])
            .await
        {
            Ok(stdout) => {
                let binaries = parse_numstat_binaries(&stdout);
                for change in &mut changes {
                    change.is_binary = binaries.contains(change.path.as_str());
                }
            }
            Err(e) => warn!(%range, error = %e, "numstat failed, treating all files as text"),
        }
        Ok(changes)
    }
}

/// Parse `git diff --name-status` output.
///
/// Unknown status codes degrade to modifications, and blank lines are
/// skipped.
pub fn parse_name_status(output: &str) -> Vec<FileChange> {
    output.lines().filter_map(parse_name_status_line).collect()
}

fn parse_name_status_line(line: &str) -> Option<FileChange> {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        return None;
    }

    // Paths are taken verbatim; only the status code is trimmed.
    let mut fields = line.split('\t');
    let code = fields.next()?.trim();
    let first = fields.next().filter(|p| !p.is_empty());
    let second = fields.next().filter(|p| !p.is_empty());

    let Some(first) = first else {
        // Tolerate space-separated input from hand-written fixtures.
        let mut parts = line.split_whitespace();
        let code = parts.next()?;
        let first = parts.next()?;
        let rest: Vec<&str> = parts.collect();
        return Some(classify(code, first, rest.first().copied()));
    };
    Some(classify(code, first, second))
}

fn classify(code: &str, first: &str, second: Option<&str>) -> FileChange {
    match code.chars().next() {
        Some('R') | Some('C') => match second {
            Some(new_path) => {
                let from = first.to_string();
                let kind = if code.starts_with('R') {
                    ChangeKind::Renamed { from }
                } else {
                    ChangeKind::Copied { from }
                };
                FileChange::new(new_path, kind)
            }
            None => FileChange::new(first, ChangeKind::Modified),
        },
        Some('A') => FileChange::new(first, ChangeKind::Added),
        Some('D') => FileChange::new(first, ChangeKind::Deleted),
        _ => FileChange::new(first, ChangeKind::Modified),
    }
}

/// Paths reported as binary (`-\t-\t<path>`) by `git diff --numstat`.
pub fn parse_numstat_binaries(output: &str) -> HashSet<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(3, '\t');
            let added = fields.next()?;
            let deleted = fields.next()?;
            let path = fields.next()?.trim_end_matches('\r');
            (added == "-" && deleted == "-" && !path.is_empty()).then(|| path.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::git::{CommandOutput, ScriptedRunner};

    #[test]
    fn test_parse_basic_codes() {
        let out = "A\tsrc/new.rs\nM\tsrc/lib.rs\nD\tREADME\nR087\told.rs\tnew.rs\nC100\ta.rs\tb.rs\n";
        let changes = parse_name_status(out);
        assert_eq!(
            changes,
            vec![
                FileChange::new("src/new.rs", ChangeKind::Added),
                FileChange::new("src/lib.rs", ChangeKind::Modified),
                FileChange::new("README", ChangeKind::Deleted),
                FileChange::new("new.rs", ChangeKind::Renamed { from: "old.rs".into() }),
                FileChange::new("b.rs", ChangeKind::Copied { from: "a.rs".into() }),
            ]
        );
        assert_eq!(changes[3].old_path(), Some("old.rs"));
        assert_eq!(changes[0].old_path(), None);
    }

    #[test]
    fn test_parse_unknown_code_degrades_to_modified() {
        let changes = parse_name_status("T\tlink\nX\tweird\n\n");
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.kind == ChangeKind::Modified));
    }

    #[test]
    fn test_parse_rename_missing_new_path() {
        let changes = parse_name_status("R100\tonly.rs\n");
        assert_eq!(changes, vec![FileChange::new("only.rs", ChangeKind::Modified)]);
    }

    #[test]
    fn test_parse_space_separated() {
        let changes = parse_name_status("M a.go\nR100 old.go new.go\n");
        assert_eq!(changes[0], FileChange::new("a.go", ChangeKind::Modified));
        assert_eq!(
            changes[1],
            FileChange::new("new.go", ChangeKind::Renamed { from: "old.go".into() })
        );
    }

    #[test]
    fn test_parse_keeps_surrounding_spaces_in_paths() {
        let changes = parse_name_status(" M\t notes .txt\nR100\told name \t new name\n");
        assert_eq!(changes[0], FileChange::new(" notes .txt", ChangeKind::Modified));
        assert_eq!(
            changes[1],
            FileChange::new(" new name", ChangeKind::Renamed { from: "old name ".into() })
        );

        let binaries = parse_numstat_binaries("-\t-\t logo .png\n");
        assert!(binaries.contains(" logo .png"));
    }

    #[test]
    fn test_parse_numstat_binaries() {
        let out = "3\t1\tsrc/lib.rs\n-\t-\tassets/logo.png\n";
        let binaries = parse_numstat_binaries(out);
        assert_eq!(binaries.len(), 1);
        assert!(binaries.contains("assets/logo.png"));
    }

    #[tokio::test]
    async fn test_changes_failure_is_execution_failed() {
        let runner = ScriptedRunner::new().on(
            "diff --name-status a..b",
            CommandOutput::failed(128, "fatal: bad revision"),
        );
        let client = GitClient::new("/repo", Arc::new(runner));
        assert!(matches!(
            client.changes("a", "b").await,
            Err(IntegrationError::ExecutionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_changes_with_binary_marks_files() {
        let runner = ScriptedRunner::new()
            .on(
                "diff --name-status a..b",
                CommandOutput::ok("M\tlogo.png\nM\tmain.rs\n"),
            )
            .on(
                "diff --numstat --no-renames a..b",
                CommandOutput::ok("-\t-\tlogo.png\n2\t2\tmain.rs\n"),
            );
        let client = GitClient::new("/repo", Arc::new(runner));
        let changes = client.changes_with_binary("a", "b").await.unwrap();
        assert!(changes[0].is_binary);
        assert!(!changes[1].is_binary);
    }

    #[tokio::test]
    async fn test_changes_with_binary_tolerates_numstat_failure() {
        let runner = ScriptedRunner::new()
            .on("diff --name-status a..b", CommandOutput::ok("M\tlogo.png\n"))
            .on(
                "diff --numstat --no-renames a..b",
                CommandOutput::failed(128, "boom"),
            );
        let client = GitClient::new("/repo", Arc::new(runner));
        let changes = client.changes_with_binary("a", "b").await.unwrap();
        assert_eq!(changes.len(), 1);
        assert!(!changes[0].is_binary);
    }
}
