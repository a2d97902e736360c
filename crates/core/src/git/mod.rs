//! Git plumbing: the command runner, repository queries and change-set
//! extraction.

pub mod changes;
pub mod client;
pub mod runner;
#[cfg(any(test, feature = "test-util"))]
pub mod scripted;

pub use changes::{parse_name_status, ChangeKind, FileChange};
pub use client::GitClient;
pub use runner::{CommandOutput, CommandRunner, GitCli};
#[cfg(any(test, feature = "test-util"))]
pub use scripted::ScriptedRunner;
