//! A [`CommandRunner`] that replays canned outputs, for tests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use super::runner::{CommandOutput, CommandRunner};
use crate::errors::CommandError;

/// Replays scripted outputs keyed by the space-joined argument list and
/// records every invocation.
///
/// Several responses for the same command are served in order; the last one
/// repeats once the queue is down to it. Unscripted commands succeed with
/// empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `output` for the command `args` (e.g. `"merge-base main dev"`).
    pub fn on(self, args: &str, output: CommandOutput) -> Self {
        self.push(args, output);
        self
    }

    /// Same as [`on`](Self::on) but through a shared reference.
    pub fn push(&self, args: &str, output: CommandOutput) {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(args.to_string())
            .or_default()
            .push_back(output);
    }

    /// Drop whatever was scripted for `args` and answer with `output` only.
    pub fn replace(self, args: &str, output: CommandOutput) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(args.to_string(), VecDeque::from([output]));
        self
    }

    /// Every command issued so far, space-joined.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Whether any issued command starts with `prefix`.
    pub fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, _repo: &Path, args: &[String]) -> Result<CommandOutput, CommandError> {
        let key = args.join(" ");
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(key.clone());

        let mut responses = self
            .responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let output = match responses.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => CommandOutput::default(),
        };
        Ok(output)
    }
}
