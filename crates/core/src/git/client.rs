//! Repository queries issued through a [`CommandRunner`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::runner::{CommandOutput, CommandRunner, GitCli};
use crate::config::GitConfig;
use crate::errors::IntegrationError;

/// A repository path bound to the runner that executes git against it.
///
/// Cheap to clone; every clone shares the same runner.
#[derive(Clone)]
pub struct GitClient {
    repo_path: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for GitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitClient")
            .field("repo_path", &self.repo_path)
            .finish_non_exhaustive()
    }
}

impl GitClient {
    pub fn new<P: AsRef<Path>>(repo_path: P, runner: Arc<dyn CommandRunner>) -> Self {
        let repo_path = repo_path.as_ref().to_path_buf();
        info!(path = %repo_path.display(), "opening git repository");
        Self { repo_path, runner }
    }

    /// Bind `repo_path` to the real git binary described by `config`.
    pub fn with_cli<P: AsRef<Path>>(repo_path: P, config: &GitConfig) -> Self {
        Self::new(repo_path, Arc::new(GitCli::from_config(config)))
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Run `args` and hand back the raw output, whatever the exit code.
    pub async fn run(&self, args: &[&str]) -> Result<CommandOutput, IntegrationError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner
            .run(&self.repo_path, &args)
            .await
            .map_err(|e| IntegrationError::from_command(&args, e))
    }

    /// Run `args` and return stdout, failing on a non-zero exit.
    pub async fn run_checked(&self, args: &[&str]) -> Result<String, IntegrationError> {
        let output = self.run(args).await?;
        if !output.success() {
            let stderr = output.stderr.trim().to_string();
            warn!(cmd = %args.join(" "), exit_code = output.exit_code, %stderr, "git command failed");
            let owned: Vec<String> = args.iter().map(|a| a.to_string()).collect();
            return Err(IntegrationError::execution_failed(
                &owned,
                format!("exit {}: {}", output.exit_code, stderr),
            ));
        }
        Ok(output.stdout)
    }

    /// Resolve `name` to a full commit id.
    ///
    /// Empty names are `InvalidBranch`; names that do not resolve to a commit
    /// are `BranchNotFound`.
    pub async fn resolve_commit(&self, name: &str) -> Result<String, IntegrationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(IntegrationError::InvalidBranch(name.to_string()));
        }
        let spec = format!("{name}^{{commit}}");
        let output = self.run(&["rev-parse", "--verify", "--quiet", &spec]).await?;
        let sha = output.stdout.trim();
        if !output.success() || sha.is_empty() {
            debug!(name, "ref does not resolve to a commit");
            return Err(IntegrationError::BranchNotFound(name.to_string()));
        }
        Ok(sha.to_string())
    }

    /// The commit HEAD points at.
    pub async fn head_commit(&self) -> Result<String, IntegrationError> {
        self.resolve_commit("HEAD").await
    }

    /// Nearest common ancestor of `a` and `b`, `None` for unrelated histories.
    #[instrument(skip(self))]
    pub async fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, IntegrationError> {
        let output = self.run(&["merge-base", a, b]).await?;
        let sha = output.stdout.trim();
        match output.exit_code {
            0 if !sha.is_empty() => Ok(Some(sha.to_string())),
            // git exits 1 with no output when there is no common ancestor.
            0 | 1 if output.stderr.trim().is_empty() => Ok(None),
            code => Err(IntegrationError::ExecutionFailed {
                command: format!("merge-base {a} {b}"),
                detail: format!("exit {code}: {}", output.stderr.trim()),
            }),
        }
    }

    /// Whether `ancestor` is reachable from `descendant`.
    pub async fn is_ancestor(
        &self,
        ancestor: &str,
        descendant: &str,
    ) -> Result<bool, IntegrationError> {
        let output = self
            .run(&["merge-base", "--is-ancestor", ancestor, descendant])
            .await?;
        match output.exit_code {
            0 => Ok(true),
            1 => Ok(false),
            code => Err(IntegrationError::ExecutionFailed {
                command: format!("merge-base --is-ancestor {ancestor} {descendant}"),
                detail: format!("exit {code}: {}", output.stderr.trim()),
            }),
        }
    }

    /// `true` when `status --porcelain` reports nothing pending.
    pub async fn is_clean(&self) -> Result<bool, IntegrationError> {
        let stdout = self.run_checked(&["status", "--porcelain"]).await?;
        Ok(stdout.trim().is_empty())
    }

    /// Fail with `DirtyWorkingTree` unless the working tree is clean.
    pub async fn ensure_clean(&self) -> Result<(), IntegrationError> {
        if self.is_clean().await? {
            Ok(())
        } else {
            info!(path = %self.repo_path.display(), "working tree is dirty");
            Err(IntegrationError::DirtyWorkingTree)
        }
    }

    /// Location of `name` inside the git directory (`rev-parse --git-path`).
    pub async fn git_path(&self, name: &str) -> Result<PathBuf, IntegrationError> {
        let stdout = self.run_checked(&["rev-parse", "--git-path", name]).await?;
        let path = PathBuf::from(stdout.trim());
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(self.repo_path.join(path))
        }
    }

    /// Whether `name` exists inside the git directory.
    pub async fn git_path_exists(&self, name: &str) -> Result<bool, IntegrationError> {
        let path = self.git_path(name).await?;
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }
}
