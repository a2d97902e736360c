//! Rebase lifecycle: start, continue, skip, abort.
//!
//! Whether a rebase is paused is always read fresh from the repository's
//! `rebase-merge` / `rebase-apply` directories; nothing is cached here.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::progress::{
    count_conflicts, count_rebased_commits, read_progress, status_from_metadata, RebaseProgress,
    RebaseStatus,
};
use crate::errors::IntegrationError;
use crate::git::{CommandOutput, GitClient};

const REBASE_MERGE_DIR: &str = "rebase-merge";
const REBASE_APPLY_DIR: &str = "rebase-apply";

/// What to rebase and onto what.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseOptions {
    /// Branch to replay onto when no `upstream` is given.
    pub branch: Option<String>,
    /// Passed as `--onto`; also the upstream when nothing else is set.
    pub onto: Option<String>,
    pub upstream: Option<String>,
    pub interactive: bool,
    pub auto_squash: bool,
    pub preserve_merges: bool,
}

impl RebaseOptions {
    /// Rebase the checked-out branch onto `branch`.
    pub fn onto_branch(branch: impl Into<String>) -> Self {
        Self {
            branch: Some(branch.into()),
            ..Self::default()
        }
    }

    fn upstream_ref(&self) -> Option<&str> {
        [&self.upstream, &self.branch, &self.onto]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseResult {
    pub success: bool,
    /// Advisory; scraped from git's progress output.
    pub commits_rebased: usize,
    pub conflicts_found: usize,
    /// HEAD after the call, when it could be read.
    pub current_commit: Option<String>,
    pub status: RebaseStatus,
    pub message: String,
}

/// Drives rebases in one repository.
#[derive(Debug, Clone)]
pub struct RebaseOrchestrator {
    client: GitClient,
}

impl RebaseOrchestrator {
    pub fn new(client: GitClient) -> Self {
        Self { client }
    }

    /// `InProgress` while git has rebase metadata on disk, `Complete`
    /// otherwise.
    pub async fn status(&self) -> Result<RebaseStatus, IntegrationError> {
        let merge = self.client.git_path_exists(REBASE_MERGE_DIR).await?;
        let apply = self.client.git_path_exists(REBASE_APPLY_DIR).await?;
        Ok(status_from_metadata(merge, apply))
    }

    /// Step counters of the paused rebase, `None` when none is running or
    /// git has not written them.
    pub async fn progress(&self) -> Result<Option<RebaseProgress>, IntegrationError> {
        let merge_dir = self.client.git_path(REBASE_MERGE_DIR).await?;
        if let Some(progress) = read_progress(&merge_dir, "msgnum", "end").await {
            return Ok(Some(progress));
        }
        let apply_dir = self.client.git_path(REBASE_APPLY_DIR).await?;
        Ok(read_progress(&apply_dir, "next", "last").await)
    }

    /// Start a rebase of the checked-out branch.
    #[instrument(skip(self, opts), fields(repo = %self.client.repo_path().display()))]
    pub async fn start(&self, opts: &RebaseOptions) -> Result<RebaseResult, IntegrationError> {
        if self.status().await? == RebaseStatus::InProgress {
            return Err(IntegrationError::RebaseInProgress);
        }
        self.client.ensure_clean().await?;

        let args = build_rebase_args(opts)?;
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        debug!(cmd = %args.join(" "), "starting rebase");
        let output = self.client.run(&arg_refs).await?;
        self.outcome(output, "rebase completed").await
    }

    /// Resume after conflicts have been resolved and staged.
    #[instrument(skip(self), fields(repo = %self.client.repo_path().display()))]
    pub async fn continue_(&self) -> Result<RebaseResult, IntegrationError> {
        self.require_in_progress().await?;
        let output = self.client.run(&["rebase", "--continue"]).await?;
        self.outcome(output, "rebase continued").await
    }

    /// Drop the commit that stopped the rebase and carry on.
    #[instrument(skip(self), fields(repo = %self.client.repo_path().display()))]
    pub async fn skip(&self) -> Result<RebaseResult, IntegrationError> {
        self.require_in_progress().await?;
        let output = self.client.run(&["rebase", "--skip"]).await?;
        self.outcome(output, "commit skipped").await
    }

    /// Restore the branch to where it was before the rebase started.
    #[instrument(skip(self), fields(repo = %self.client.repo_path().display()))]
    pub async fn abort(&self) -> Result<RebaseResult, IntegrationError> {
        self.require_in_progress().await?;
        self.client.run_checked(&["rebase", "--abort"]).await?;
        info!("rebase aborted");
        Ok(RebaseResult {
            success: true,
            commits_rebased: 0,
            conflicts_found: 0,
            current_commit: self.current_commit().await,
            status: RebaseStatus::Aborted,
            message: "rebase aborted".to_string(),
        })
    }

    async fn require_in_progress(&self) -> Result<(), IntegrationError> {
        match self.status().await? {
            RebaseStatus::InProgress => Ok(()),
            _ => Err(IntegrationError::NoRebaseInProgress),
        }
    }

    async fn current_commit(&self) -> Option<String> {
        match self.client.head_commit().await {
            Ok(sha) => Some(sha),
            Err(e) => {
                warn!(error = %e, "could not read HEAD after rebase step");
                None
            }
        }
    }

    /// Turn the output of start/continue/skip into a result. A non-zero exit
    /// is a conflict stop.
    async fn outcome(
        &self,
        output: CommandOutput,
        done_message: &str,
    ) -> Result<RebaseResult, IntegrationError> {
        let combined = output.combined();
        let current_commit = self.current_commit().await;

        if !output.success() {
            let conflicts_found = count_conflicts(&combined).max(1);
            let message = first_line(&output.stderr)
                .or_else(|| first_line(&output.stdout))
                .unwrap_or("rebase stopped")
                .to_string();
            warn!(exit_code = output.exit_code, conflicts_found, "rebase stopped on conflicts");
            return Ok(RebaseResult {
                success: false,
                commits_rebased: 0,
                conflicts_found,
                current_commit,
                status: RebaseStatus::Conflict,
                message,
            });
        }

        let commits_rebased = count_rebased_commits(&combined);
        // `edit` and `break` stop an interactive rebase with exit 0.
        let status = self.status().await?;
        info!(commits_rebased, %status, "{done_message}");
        Ok(RebaseResult {
            success: true,
            commits_rebased,
            conflicts_found: 0,
            current_commit,
            status,
            message: done_message.to_string(),
        })
    }
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

/// `rebase [-i] [--autosquash] [--preserve-merges] [--onto <onto>] <upstream>`
pub fn build_rebase_args(opts: &RebaseOptions) -> Result<Vec<String>, IntegrationError> {
    let upstream = opts
        .upstream_ref()
        .ok_or(IntegrationError::MissingRebaseTarget)?;

    let mut args = vec!["rebase".to_string()];
    if opts.interactive {
        args.push("-i".into());
    }
    if opts.auto_squash {
        args.push("--autosquash".into());
    }
    if opts.preserve_merges {
        args.push("--preserve-merges".into());
    }
    if let Some(onto) = opts.onto.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        args.push("--onto".into());
        args.push(onto.to_string());
    }
    args.push(upstream.to_string());
    Ok(args)
}
