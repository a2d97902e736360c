//! Conflict detection logic.
//!
//! Given two branches, the detector finds their merge base, extracts what
//! each side changed since then, and classifies every path touched on both
//! sides.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::report::{ConflictReport, MergePreview};
use crate::config::DetectConfig;
use crate::errors::IntegrationError;
use crate::git::{ChangeKind, FileChange, GitClient};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Categorisation of a conflict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Both sides modified the same file content.
    Content,
    /// Both sides renamed the same file.
    Rename,
    /// One side edited, the other deleted.
    Delete,
    /// Binary file changed on both sides.
    Binary,
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Content => write!(f, "content"),
            Self::Rename => write!(f, "rename"),
            Self::Delete => write!(f, "delete"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// How much attention a conflict needs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// A predicted conflict on one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub file_path: String,
    pub conflict_type: ConflictType,
    pub source_change: FileChange,
    pub target_change: FileChange,
    pub severity: Severity,
    /// Only set for structurally identical changes (same rename on both
    /// sides); never inferred from content.
    pub auto_resolvable: bool,
    pub description: String,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Compare two change sets taken against the same merge base and return the
/// conflicts between them, sorted by path.
pub fn find_conflicts(source: &[FileChange], target: &[FileChange]) -> Vec<Conflict> {
    let target_by_path: HashMap<&str, &FileChange> =
        target.iter().map(|c| (c.path.as_str(), c)).collect();

    let mut conflicts: Vec<Conflict> = source
        .iter()
        .filter_map(|s| {
            let t = target_by_path.get(s.path.as_str())?;
            let conflict = classify_conflict(s, t)?;
            debug!(
                path = %conflict.file_path,
                conflict_type = %conflict.conflict_type,
                severity = %conflict.severity,
                "conflict detected"
            );
            Some(conflict)
        })
        .collect();

    conflicts.extend(divergent_renames(source, target));
    conflicts.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    conflicts
}

/// Classify two changes to the same path; first match wins.
fn classify_conflict(source: &FileChange, target: &FileChange) -> Option<Conflict> {
    let path = source.path.as_str();
    let (conflict_type, severity, auto_resolvable, description) =
        match (&source.kind, &target.kind) {
            (ChangeKind::Modified, ChangeKind::Modified) if source.is_binary || target.is_binary => (
                ConflictType::Binary,
                Severity::Medium,
                false,
                format!("binary file {path} modified on both branches"),
            ),
            (ChangeKind::Modified, ChangeKind::Modified) => (
                ConflictType::Content,
                Severity::Medium,
                false,
                format!("{path} modified on both branches"),
            ),
            (ChangeKind::Deleted, ChangeKind::Modified) => (
                ConflictType::Delete,
                Severity::High,
                false,
                format!("{path} deleted on source but modified on target"),
            ),
            (ChangeKind::Modified, ChangeKind::Deleted) => (
                ConflictType::Delete,
                Severity::High,
                false,
                format!("{path} modified on source but deleted on target"),
            ),
            (ChangeKind::Renamed { from: a }, ChangeKind::Renamed { from: b }) if a == b => (
                ConflictType::Rename,
                Severity::Low,
                true,
                format!("{a} renamed to {path} on both branches"),
            ),
            _ => return None,
        };

    Some(Conflict {
        file_path: path.to_string(),
        conflict_type,
        source_change: source.clone(),
        target_change: target.clone(),
        severity,
        auto_resolvable,
        description,
    })
}

/// Both sides renamed the same original file to different paths.
fn divergent_renames(source: &[FileChange], target: &[FileChange]) -> Vec<Conflict> {
    let target_renames: HashMap<&str, &FileChange> = target
        .iter()
        .filter_map(|c| match &c.kind {
            ChangeKind::Renamed { from } => Some((from.as_str(), c)),
            _ => None,
        })
        .collect();

    source
        .iter()
        .filter_map(|s| {
            let ChangeKind::Renamed { from } = &s.kind else {
                return None;
            };
            let t = target_renames.get(from.as_str())?;
            if t.path == s.path {
                return None;
            }
            debug!(from = %from, source_to = %s.path, target_to = %t.path, "divergent rename detected");
            Some(Conflict {
                file_path: from.clone(),
                conflict_type: ConflictType::Rename,
                source_change: s.clone(),
                target_change: (*t).clone(),
                severity: Severity::High,
                auto_resolvable: false,
                description: format!(
                    "{from} renamed to {} on source and {} on target",
                    s.path, t.path
                ),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Predicts the conflicts of merging one branch into another.
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    client: GitClient,
    /// Used by [`detect_with_defaults`](Self::detect_with_defaults) and
    /// [`preview_with_defaults`](Self::preview_with_defaults).
    include_binary: bool,
}

/// Everything one analysis pass produces.
struct Analysis {
    report: ConflictReport,
    source_changes: Vec<FileChange>,
}

impl ConflictDetector {
    pub fn new(client: GitClient) -> Self {
        Self {
            client,
            include_binary: false,
        }
    }

    /// Detector whose defaults come from the `[detect]` config section.
    pub fn from_config(client: GitClient, config: &DetectConfig) -> Self {
        Self {
            client,
            include_binary: config.include_binary,
        }
    }

    pub fn client(&self) -> &GitClient {
        &self.client
    }

    pub fn include_binary(&self) -> bool {
        self.include_binary
    }

    /// [`detect`](Self::detect) with the configured binary setting.
    pub async fn detect_with_defaults(
        &self,
        source: &str,
        target: &str,
    ) -> Result<ConflictReport, IntegrationError> {
        self.detect(source, target, self.include_binary).await
    }

    /// [`preview`](Self::preview) with the configured binary setting.
    pub async fn preview_with_defaults(
        &self,
        source: &str,
        target: &str,
    ) -> Result<MergePreview, IntegrationError> {
        self.preview(source, target, self.include_binary).await
    }

    /// Predict the conflicts of merging `source` into `target`.
    #[instrument(skip(self), fields(repo = %self.client.repo_path().display()))]
    pub async fn detect(
        &self,
        source: &str,
        target: &str,
        include_binary: bool,
    ) -> Result<ConflictReport, IntegrationError> {
        Ok(self.analyze(source, target, include_binary).await?.report)
    }

    /// [`detect`](Self::detect) plus fast-forward and change counts.
    #[instrument(skip(self), fields(repo = %self.client.repo_path().display()))]
    pub async fn preview(
        &self,
        source: &str,
        target: &str,
        include_binary: bool,
    ) -> Result<MergePreview, IntegrationError> {
        let Analysis {
            report,
            source_changes,
        } = self.analyze(source, target, include_binary).await?;

        let mut files_added = 0;
        let mut files_changed = 0;
        let mut files_deleted = 0;
        for change in &source_changes {
            match change.kind {
                ChangeKind::Added | ChangeKind::Copied { .. } => files_added += 1,
                ChangeKind::Modified | ChangeKind::Renamed { .. } => files_changed += 1,
                ChangeKind::Deleted => files_deleted += 1,
            }
        }

        let can_fast_forward = self.can_fast_forward(source, target).await;
        Ok(MergePreview {
            report,
            can_fast_forward,
            files_added,
            files_changed,
            files_deleted,
        })
    }

    /// Whether `target` is a strict ancestor of `source`, i.e. merging
    /// `source` into `target` can fast-forward.
    ///
    /// This is a hint: any failure to answer is reported as `false`.
    pub async fn can_fast_forward(&self, source: &str, target: &str) -> bool {
        match self.check_fast_forward(source, target).await {
            Ok(ff) => ff,
            Err(e) => {
                warn!(source, target, error = %e, "fast-forward check failed, assuming no");
                false
            }
        }
    }

    async fn check_fast_forward(&self, source: &str, target: &str) -> Result<bool, IntegrationError> {
        let source_sha = self.client.resolve_commit(source).await?;
        let target_sha = self.client.resolve_commit(target).await?;
        if source_sha == target_sha {
            return Ok(false);
        }
        self.client.is_ancestor(&target_sha, &source_sha).await
    }

    async fn analyze(
        &self,
        source: &str,
        target: &str,
        include_binary: bool,
    ) -> Result<Analysis, IntegrationError> {
        info!(source, target, "detecting conflicts");

        let source_sha = self.client.resolve_commit(source).await?;
        let target_sha = self.client.resolve_commit(target).await?;

        let merge_base = self
            .client
            .merge_base(&source_sha, &target_sha)
            .await?
            .ok_or_else(|| IntegrationError::NoMergeBase {
                source_ref: source.to_string(),
                target_ref: target.to_string(),
            })?;

        let source_changes = self
            .client
            .changes_with_binary(&merge_base, &source_sha)
            .await?;
        let target_changes = self
            .client
            .changes_with_binary(&merge_base, &target_sha)
            .await?;

        let mut conflicts = find_conflicts(&source_changes, &target_changes);
        if !include_binary {
            conflicts.retain(|c| c.conflict_type != ConflictType::Binary);
        }

        let report = ConflictReport::new(source, target, merge_base, conflicts);
        info!(
            total = report.total_conflicts,
            auto = report.can_auto_resolve,
            difficulty = %report.difficulty,
            "conflict detection complete"
        );
        Ok(Analysis {
            report,
            source_changes,
        })
    }
}
