//! Merge execution.
//!
//! One call walks `validate -> clean tree -> already up to date? -> execute`
//! and classifies what git did as a merge, a conflict or a hard failure.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::stats::{parse_merge_stats, MergeStats};
use super::strategy::MergeStrategy;
use crate::config::MergeDefaults;
use crate::conflict::{Conflict, ConflictDetector};
use crate::errors::IntegrationError;
use crate::git::GitClient;

pub const ALREADY_UP_TO_DATE: &str = "already up to date";

// ---------------------------------------------------------------------------
// Options & results
// ---------------------------------------------------------------------------

/// What to merge and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Ref to merge in. For octopus merges, several refs separated by
    /// whitespace.
    pub source: String,
    /// Ref being merged into; expected to be checked out.
    pub target: String,
    pub strategy: MergeStrategy,
    /// Let git fast-forward instead of forcing a merge commit.
    pub allow_fast_forward: bool,
    pub commit_message: Option<String>,
    pub no_commit: bool,
    pub squash: bool,
}

impl MergeOptions {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            strategy: MergeStrategy::default(),
            allow_fast_forward: false,
            commit_message: None,
            no_commit: false,
            squash: false,
        }
    }

    /// Options seeded from the `[merge]` config section.
    pub fn from_config(
        source: impl Into<String>,
        target: impl Into<String>,
        defaults: &MergeDefaults,
    ) -> Self {
        Self {
            strategy: defaults.default_strategy,
            allow_fast_forward: defaults.allow_fast_forward,
            ..Self::new(source, target)
        }
    }

    pub fn with_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = Some(message.into());
        self
    }

    /// Source refs, split on whitespace.
    pub fn sources(&self) -> Vec<&str> {
        self.source.split_whitespace().collect()
    }
}

/// What a merge call ended with. Exactly one shape applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// git completed; `commit_hash` is HEAD afterwards.
    Merged { commit_hash: String },
    /// git stopped on conflicts.
    Conflicted { conflicts: Vec<Conflict> },
    /// Nothing was executed.
    NoOp { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub success: bool,
    pub strategy: MergeStrategy,
    #[serde(flatten)]
    pub outcome: MergeOutcome,
    pub files_changed: usize,
    pub additions: usize,
    pub deletions: usize,
}

impl MergeResult {
    fn no_op(strategy: MergeStrategy, message: &str) -> Self {
        Self {
            success: true,
            strategy,
            outcome: MergeOutcome::NoOp {
                message: message.to_string(),
            },
            files_changed: 0,
            additions: 0,
            deletions: 0,
        }
    }

    fn merged(strategy: MergeStrategy, commit_hash: String, stats: MergeStats) -> Self {
        Self {
            success: true,
            strategy,
            outcome: MergeOutcome::Merged { commit_hash },
            files_changed: stats.files_changed,
            additions: stats.additions,
            deletions: stats.deletions,
        }
    }

    fn conflicted(strategy: MergeStrategy, conflicts: Vec<Conflict>) -> Self {
        Self {
            success: false,
            strategy,
            outcome: MergeOutcome::Conflicted { conflicts },
            files_changed: 0,
            additions: 0,
            deletions: 0,
        }
    }

    pub fn commit_hash(&self) -> Option<&str> {
        match &self.outcome {
            MergeOutcome::Merged { commit_hash } => Some(commit_hash),
            _ => None,
        }
    }

    pub fn conflicts(&self) -> &[Conflict] {
        match &self.outcome {
            MergeOutcome::Conflicted { conflicts } => conflicts,
            _ => &[],
        }
    }

    pub fn message(&self) -> Option<&str> {
        match &self.outcome {
            MergeOutcome::NoOp { message } => Some(message),
            _ => None,
        }
    }

    /// Turn a conflict outcome into [`IntegrationError::MergeConflict`].
    pub fn into_result(self) -> Result<Self, IntegrationError> {
        if let MergeOutcome::Conflicted { conflicts } = &self.outcome {
            return Err(IntegrationError::MergeConflict {
                files: conflicts.iter().map(|c| c.file_path.clone()).collect(),
            });
        }
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs merges in one repository.
#[derive(Debug, Clone)]
pub struct MergeOrchestrator {
    client: GitClient,
    detector: ConflictDetector,
}

impl MergeOrchestrator {
    pub fn new(client: GitClient) -> Self {
        let detector = ConflictDetector::new(client.clone());
        Self { client, detector }
    }

    pub fn detector(&self) -> &ConflictDetector {
        &self.detector
    }

    /// Merge `opts.source` into the checked-out `opts.target`.
    ///
    /// Conflicts are an `Ok` result with `success == false`; `Err` means the
    /// request was invalid, the tree was dirty, or git itself failed.
    #[instrument(
        skip(self, opts),
        fields(repo = %self.client.repo_path().display(), source = %opts.source, target = %opts.target, strategy = %opts.strategy)
    )]
    pub async fn merge(&self, opts: &MergeOptions) -> Result<MergeResult, IntegrationError> {
        let sources = self.validate(opts).await?;
        let target_sha = self.client.resolve_commit(&opts.target).await?;

        self.client.ensure_clean().await?;

        if let [only] = sources.as_slice() {
            if *only == target_sha {
                info!("source and target are the same commit, nothing to merge");
                return Ok(MergeResult::no_op(opts.strategy, ALREADY_UP_TO_DATE));
            }
        }

        if let Ok(head) = self.client.head_commit().await {
            if head != target_sha {
                warn!(target = %opts.target, "target is not checked out; git merges into HEAD");
            }
        }

        let force_merge_commit = opts.strategy != MergeStrategy::FastForward
            && !opts.allow_fast_forward
            && !opts.squash
            && self.any_fast_forward(opts).await;

        let args = build_merge_args(opts, force_merge_commit);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        debug!(cmd = %args.join(" "), "executing merge");
        let output = self.client.run(&arg_refs).await?;

        if !output.success() {
            return self.classify_failure(opts, &args, output.combined()).await;
        }

        let commit_hash = self.client.head_commit().await?;
        let stats = parse_merge_stats(&output.stdout);
        info!(
            %commit_hash,
            files_changed = stats.files_changed,
            additions = stats.additions,
            deletions = stats.deletions,
            "merge completed"
        );
        Ok(MergeResult::merged(opts.strategy, commit_hash, stats))
    }

    /// Whether a merge is stopped mid-way (`MERGE_HEAD` exists).
    pub async fn in_progress(&self) -> Result<bool, IntegrationError> {
        self.client.git_path_exists("MERGE_HEAD").await
    }

    /// Abandon a stopped merge.
    #[instrument(skip(self), fields(repo = %self.client.repo_path().display()))]
    pub async fn abort(&self) -> Result<(), IntegrationError> {
        if !self.in_progress().await? {
            return Err(IntegrationError::NoMergeInProgress);
        }
        self.client.run_checked(&["merge", "--abort"]).await?;
        info!("merge aborted");
        Ok(())
    }

    /// Check refs and strategy; returns the resolved source commits.
    async fn validate(&self, opts: &MergeOptions) -> Result<Vec<String>, IntegrationError> {
        if opts.target.trim().is_empty() {
            return Err(IntegrationError::InvalidBranch(opts.target.clone()));
        }
        let names = opts.sources();
        if names.is_empty() {
            return Err(IntegrationError::InvalidBranch(opts.source.clone()));
        }

        match (opts.strategy, names.len()) {
            (MergeStrategy::Octopus, 1) => {
                return Err(IntegrationError::InvalidStrategy {
                    strategy: opts.strategy.to_string(),
                    detail: "octopus requires more than one source branch".into(),
                });
            }
            (MergeStrategy::Octopus, _) | (_, 1) => {}
            (strategy, _) => {
                return Err(IntegrationError::InvalidStrategy {
                    strategy: strategy.to_string(),
                    detail: "multiple source branches require the octopus strategy".into(),
                });
            }
        }

        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            resolved.push(self.client.resolve_commit(name).await?);
        }
        Ok(resolved)
    }

    /// Whether git could fast-forward the target through any source.
    async fn any_fast_forward(&self, opts: &MergeOptions) -> bool {
        for source in opts.sources() {
            if self.detector.can_fast_forward(source, &opts.target).await {
                return true;
            }
        }
        false
    }

    /// Decide between a conflict outcome and a hard failure after a non-zero
    /// exit. Only a merge git actually stopped mid-way counts as conflicted.
    async fn classify_failure(
        &self,
        opts: &MergeOptions,
        args: &[String],
        output: String,
    ) -> Result<MergeResult, IntegrationError> {
        let detail = output.trim().to_string();
        let stopped_on_conflicts =
            output.contains("CONFLICT") || self.in_progress().await.unwrap_or(false);

        if !stopped_on_conflicts {
            let overlapping = self.overlapping_paths(opts).await;
            warn!(output = %detail, overlapping = overlapping.len(), "merge failed without conflicts");
            let detail = if overlapping.is_empty() {
                detail
            } else {
                format!("{detail} (paths changed on both sides: {})", overlapping.join(", "))
            };
            return Err(IntegrationError::execution_failed(args, detail));
        }

        let mut conflicts = Vec::new();
        for source in opts.sources() {
            match self.detector.detect(source, &opts.target, true).await {
                Ok(report) => conflicts.extend(report.conflicts),
                Err(e) => {
                    warn!(source, error = %e, "conflict detection after failed merge failed");
                    return Err(IntegrationError::execution_failed(args, detail));
                }
            }
        }

        info!(count = conflicts.len(), "merge stopped on conflicts");
        Ok(MergeResult::conflicted(opts.strategy, conflicts))
    }

    /// Paths both sides touched, for error context. Detection failures are
    /// skipped.
    async fn overlapping_paths(&self, opts: &MergeOptions) -> Vec<String> {
        let mut paths = Vec::new();
        for source in opts.sources() {
            match self.detector.detect(source, &opts.target, true).await {
                Ok(report) => paths.extend(report.conflicted_paths()),
                Err(e) => debug!(source, error = %e, "no conflict context for failed merge"),
            }
        }
        paths
    }
}

/// `merge [strategy flags] [--no-ff|--ff-only] [--squash] [--no-commit] [-m <msg>] <source...>`
pub fn build_merge_args(opts: &MergeOptions, force_merge_commit: bool) -> Vec<String> {
    let mut args = vec!["merge".to_string()];
    args.extend(opts.strategy.args().iter().map(|a| a.to_string()));
    if force_merge_commit && opts.strategy != MergeStrategy::FastForward {
        args.push("--no-ff".into());
    }
    if opts.squash {
        args.push("--squash".into());
    }
    if opts.no_commit {
        args.push("--no-commit".into());
    }
    if let Some(message) = opts.commit_message.as_deref().filter(|m| !m.trim().is_empty()) {
        args.push("-m".into());
        args.push(message.to_string());
    }
    args.extend(opts.sources().into_iter().map(String::from));
    args
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::git::{CommandOutput, ScriptedRunner};

    fn ok(stdout: &str) -> CommandOutput {
        CommandOutput::ok(stdout)
    }

    /// `feature` at f1, `main` at m1 and checked out, clean tree, no
    /// fast-forward possible.
    fn repo() -> ScriptedRunner {
        ScriptedRunner::new()
            .on("rev-parse --verify --quiet feature^{commit}", ok("f1\n"))
            .on("rev-parse --verify --quiet main^{commit}", ok("m1\n"))
            .on("rev-parse --verify --quiet HEAD^{commit}", ok("m1\n"))
            .on("status --porcelain", ok(""))
            .on("merge-base --is-ancestor m1 f1", CommandOutput::failed(1, ""))
            .on(
                "rev-parse --git-path MERGE_HEAD",
                ok("/nonexistent/mergeflow/MERGE_HEAD\n"),
            )
    }

    fn orchestrator(runner: ScriptedRunner) -> (MergeOrchestrator, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        (
            MergeOrchestrator::new(GitClient::new("/repo", runner.clone())),
            runner,
        )
    }

    #[tokio::test]
    async fn test_same_commit_is_up_to_date() {
        let runner = ScriptedRunner::new()
            .on("rev-parse --verify --quiet main^{commit}", ok("m1\n"))
            .on("status --porcelain", ok(""));
        let (merger, runner) = orchestrator(runner);

        let result = merger.merge(&MergeOptions::new("main", "main")).await.unwrap();
        assert!(result.success);
        assert_eq!(result.message(), Some(ALREADY_UP_TO_DATE));
        assert!(!runner.called("merge "));
    }

    #[tokio::test]
    async fn test_dirty_tree_is_rejected() {
        let runner = ScriptedRunner::new()
            .on("rev-parse --verify --quiet feature^{commit}", ok("f1\n"))
            .on("rev-parse --verify --quiet main^{commit}", ok("m1\n"))
            .on("status --porcelain", ok(" M src/lib.rs\n"));
        let (merger, runner) = orchestrator(runner);

        let err = merger
            .merge(&MergeOptions::new("feature", "main"))
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::DirtyWorkingTree));
        assert!(!runner.called("merge "));
    }

    #[tokio::test]
    async fn test_octopus_needs_several_sources() {
        let (merger, runner) = orchestrator(repo());
        let opts = MergeOptions::new("feature", "main").with_strategy(MergeStrategy::Octopus);
        let err = merger.merge(&opts).await.unwrap_err();
        assert!(matches!(err, IntegrationError::InvalidStrategy { .. }));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_several_sources_need_octopus() {
        let (merger, _) = orchestrator(repo());
        let err = merger
            .merge(&MergeOptions::new("feature hotfix", "main"))
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::InvalidStrategy { .. }));
    }

    #[tokio::test]
    async fn test_missing_source_branch() {
        let (merger, runner) = orchestrator(
            repo().on("rev-parse --verify --quiet ghost^{commit}", CommandOutput::failed(1, "")),
        );
        let err = merger
            .merge(&MergeOptions::new("ghost", "main"))
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::BranchNotFound(ref b) if b == "ghost"));
        assert!(!runner.called("status"));
    }

    #[tokio::test]
    async fn test_forces_merge_commit_when_fast_forward_possible() {
        let runner = ScriptedRunner::new()
            .on("rev-parse --verify --quiet feature^{commit}", ok("f1\n"))
            .on("rev-parse --verify --quiet main^{commit}", ok("m1\n"))
            .on("rev-parse --verify --quiet HEAD^{commit}", ok("m1\n"))
            .on("rev-parse --verify --quiet HEAD^{commit}", ok("c9\n"))
            .on("status --porcelain", ok(""))
            .on("merge-base --is-ancestor m1 f1", ok(""))
            .on(
                "merge -s recursive --no-ff feature",
                ok("Merge made by the 'ort' strategy.\n a.rs | 3 ++-\n 1 file changed, 2 insertions(+), 1 deletion(-)\n"),
            );
        let (merger, runner) = orchestrator(runner);

        let result = merger.merge(&MergeOptions::new("feature", "main")).await.unwrap();
        assert!(result.success);
        assert_eq!(result.commit_hash(), Some("c9"));
        assert_eq!(result.files_changed, 1);
        assert_eq!(result.additions, 2);
        assert_eq!(result.deletions, 1);
        assert!(runner.called("merge -s recursive --no-ff feature"));
    }

    #[tokio::test]
    async fn test_allowed_fast_forward_skips_no_ff() {
        let runner = repo().replace("merge-base --is-ancestor m1 f1", ok(""));
        let (merger, runner) = orchestrator(runner);
        let mut opts = MergeOptions::new("feature", "main");
        opts.allow_fast_forward = true;

        let result = merger.merge(&opts).await.unwrap();
        assert!(result.success);
        assert!(runner.called("merge -s recursive feature"));
        assert!(!runner.called("merge-base --is-ancestor"));
    }

    #[tokio::test]
    async fn test_fast_forward_strategy_uses_ff_only() {
        let (merger, runner) = orchestrator(repo());
        let opts = MergeOptions::new("feature", "main").with_strategy(MergeStrategy::FastForward);
        merger.merge(&opts).await.unwrap();
        assert!(runner.called("merge --ff-only feature"));
    }

    #[tokio::test]
    async fn test_conflict_outcome_carries_detected_conflicts() {
        let runner = repo()
            .on(
                "merge -s recursive feature",
                CommandOutput {
                    stdout: "Auto-merging a.rs\nCONFLICT (content): Merge conflict in a.rs\n".into(),
                    stderr: "Automatic merge failed; fix conflicts and then commit the result.\n".into(),
                    exit_code: 1,
                },
            )
            .on("merge-base f1 m1", ok("b0\n"))
            .on("diff --name-status b0..f1", ok("M\ta.rs\n"))
            .on("diff --name-status b0..m1", ok("M\ta.rs\n"));
        let (merger, _) = orchestrator(runner);

        let result = merger.merge(&MergeOptions::new("feature", "main")).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.conflicts().len(), 1);
        assert_eq!(result.conflicts()[0].file_path, "a.rs");
        assert!(result.commit_hash().is_none());

        let err = result.into_result().unwrap_err();
        assert!(matches!(err, IntegrationError::MergeConflict { ref files } if files == &["a.rs"]));
    }

    #[tokio::test]
    async fn test_hard_failure_surfaces_execution_error() {
        let runner = repo()
            .on(
                "merge -s recursive feature",
                CommandOutput::failed(128, "fatal: refusing to merge unrelated histories"),
            )
            .on("merge-base f1 m1", CommandOutput::failed(1, ""));
        let (merger, _) = orchestrator(runner);

        let err = merger
            .merge(&MergeOptions::new("feature", "main"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IntegrationError::ExecutionFailed { ref detail, .. } if detail.contains("unrelated histories")
        ));
    }

    #[tokio::test]
    async fn test_ff_only_refusal_is_not_a_conflict() {
        let runner = repo()
            .on(
                "merge --ff-only feature",
                CommandOutput::failed(128, "fatal: Not possible to fast-forward, aborting."),
            )
            .on("merge-base f1 m1", ok("b0\n"))
            .on("diff --name-status b0..f1", ok("M\ta.rs\n"))
            .on("diff --name-status b0..m1", ok("M\ta.rs\n"));
        let (merger, _) = orchestrator(runner);
        let opts = MergeOptions::new("feature", "main").with_strategy(MergeStrategy::FastForward);

        let err = merger.merge(&opts).await.unwrap_err();
        assert!(matches!(
            err,
            IntegrationError::ExecutionFailed { ref detail, .. }
                if detail.contains("Not possible to fast-forward") && detail.contains("a.rs")
        ));
    }

    /// `one` at o1 and `two` at t1 over a checked-out `main` at m1.
    fn octopus_repo() -> ScriptedRunner {
        ScriptedRunner::new()
            .on("rev-parse --verify --quiet one^{commit}", ok("o1\n"))
            .on("rev-parse --verify --quiet two^{commit}", ok("t1\n"))
            .on("rev-parse --verify --quiet main^{commit}", ok("m1\n"))
            .on("rev-parse --verify --quiet HEAD^{commit}", ok("m1\n"))
            .on("status --porcelain", ok(""))
            .on("merge-base --is-ancestor m1 o1", ok(""))
    }

    #[tokio::test]
    async fn test_octopus_forces_merge_commit_when_fast_forward_possible() {
        let (merger, runner) = orchestrator(octopus_repo());
        let opts = MergeOptions::new("one two", "main").with_strategy(MergeStrategy::Octopus);

        let result = merger.merge(&opts).await.unwrap();
        assert!(result.success);
        assert!(runner.called("merge -s octopus --no-ff one two"));
    }

    #[tokio::test]
    async fn test_octopus_may_fast_forward_when_allowed() {
        let (merger, runner) = orchestrator(octopus_repo());
        let mut opts = MergeOptions::new("one two", "main").with_strategy(MergeStrategy::Octopus);
        opts.allow_fast_forward = true;

        merger.merge(&opts).await.unwrap();
        assert!(runner.called("merge -s octopus one two"));
        assert!(!runner.called("merge-base --is-ancestor"));
    }

    #[tokio::test]
    async fn test_abort_without_merge() {
        let runner = ScriptedRunner::new().on(
            "rev-parse --git-path MERGE_HEAD",
            ok("/nonexistent/mergeflow/MERGE_HEAD\n"),
        );
        let (merger, runner) = orchestrator(runner);
        let err = merger.abort().await.unwrap_err();
        assert!(matches!(err, IntegrationError::NoMergeInProgress));
        assert!(!runner.called("merge --abort"));
    }

    #[tokio::test]
    async fn test_abort_in_progress_merge() {
        let dir = tempfile::tempdir().unwrap();
        let merge_head = dir.path().join("MERGE_HEAD");
        std::fs::write(&merge_head, "f1\n").unwrap();
        let runner = ScriptedRunner::new().on(
            "rev-parse --git-path MERGE_HEAD",
            ok(&format!("{}\n", merge_head.display())),
        );
        let (merger, runner) = orchestrator(runner);
        assert!(merger.in_progress().await.unwrap());
        merger.abort().await.unwrap();
        assert!(runner.called("merge --abort"));
    }

    #[test]
    fn test_build_merge_args_modifiers() {
        let mut opts = MergeOptions::new("feature", "main")
            .with_strategy(MergeStrategy::Theirs)
            .with_message("Merge feature");
        opts.squash = true;
        opts.no_commit = true;
        assert_eq!(
            build_merge_args(&opts, false),
            vec![
                "merge", "-s", "recursive", "-X", "theirs", "--squash", "--no-commit", "-m",
                "Merge feature", "feature"
            ]
        );

        let opts = MergeOptions::new("a  b\tc", "main").with_strategy(MergeStrategy::Octopus);
        assert_eq!(
            build_merge_args(&opts, false),
            vec!["merge", "-s", "octopus", "a", "b", "c"]
        );

        let opts = MergeOptions::new("feature", "main").with_strategy(MergeStrategy::Ours);
        assert_eq!(
            build_merge_args(&opts, true),
            vec!["merge", "-s", "ours", "--no-ff", "feature"]
        );
    }

    #[test]
    fn test_options_from_config() {
        let defaults = MergeDefaults {
            default_strategy: MergeStrategy::Ours,
            allow_fast_forward: true,
        };
        let opts = MergeOptions::from_config("feature", "main", &defaults);
        assert_eq!(opts.strategy, MergeStrategy::Ours);
        assert!(opts.allow_fast_forward);
        assert!(opts.commit_message.is_none());
    }
}
