//! TOML-based configuration for mergeflow.
//!
//! Every section is optional; an empty file yields the same values as
//! [`MergeflowConfig::default`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::errors::ConfigError;
use crate::merge::MergeStrategy;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeflowConfig {
    /// How the git binary is invoked.
    #[serde(default)]
    pub git: GitConfig,

    /// Defaults applied to merge options.
    #[serde(default)]
    pub merge: MergeDefaults,

    /// Conflict detection settings.
    #[serde(default)]
    pub detect: DetectConfig,
}

// ---------------------------------------------------------------------------
// Git
// ---------------------------------------------------------------------------

/// Command runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Name or path of the git binary (default `git`).
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Seconds before an individual git command is killed (default 120).
    #[serde(default = "default_timeout")]
    pub command_timeout_secs: u64,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_binary() -> String {
    "git".into()
}
fn default_timeout() -> u64 {
    120
}
fn default_log_level() -> String {
    "info".into()
}

impl GitConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            command_timeout_secs: default_timeout(),
            log_level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Defaults for [`crate::merge::MergeOptions::from_config`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeDefaults {
    /// Strategy used when the caller does not pick one.
    #[serde(default)]
    pub default_strategy: MergeStrategy,

    /// Let git fast-forward instead of forcing a merge commit.
    #[serde(default)]
    pub allow_fast_forward: bool,
}

impl Default for MergeDefaults {
    fn default() -> Self {
        Self {
            default_strategy: MergeStrategy::default(),
            allow_fast_forward: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Conflict detection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectConfig {
    /// Report conflicts on binary files.
    #[serde(default)]
    pub include_binary: bool,
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl MergeflowConfig {
    /// Load a [`MergeflowConfig`] from a TOML file at the given path.
    ///
    /// This does **not** validate the values -- call
    /// [`validate`](Self::validate) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: MergeflowConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all values are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.git.binary.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "git.binary".into(),
                detail: "git binary must not be empty".into(),
            });
        }
        if self.git.command_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "git.command_timeout_secs".into(),
                detail: "command timeout must be > 0".into(),
            });
        }
        match self.git.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "git.log_level".into(),
                    detail: format!("unknown log level '{other}'"),
                });
            }
        }
        Ok(())
    }

    /// Filter built from `git.log_level`, falling back to `info`.
    pub fn log_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.git.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    }

    /// Filter for a subscriber: `RUST_LOG` when set, otherwise
    /// [`log_filter`](Self::log_filter).
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| self.log_filter())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }
}
