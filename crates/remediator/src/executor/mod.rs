//! Remediation Executor
//!
//! The dispatcher hands a `(target, action)` pair to an [`Executor`] and gets a
//! terminal [`ExecutionResult`] back. How the action actually runs (a local
//! `ansible-playbook`, a remote runner over HTTP) is the executor's business.

pub mod command;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use command::{CommandConfig, CommandExecutor};
pub use http::{HttpConfig, HttpExecutor};

use crate::Result;

/// Result from running a remediation action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failure(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(error.into()),
        }
    }
}

/// Runs a named remediation action against a target.
///
/// Implementations must not panic on remote failure; every outcome is
/// reported through [`ExecutionResult`]. The dispatcher bounds each call with
/// its own timeout and drops the future when it elapses.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, target: &str, action: &str) -> ExecutionResult;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExecutorConfig {
    Command(CommandConfig),
    Http(HttpConfig),
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig::Command(CommandConfig::default())
    }
}

pub fn create_executor(config: &ExecutorConfig) -> Result<Arc<dyn Executor>> {
    match config {
        ExecutorConfig::Command(command) => Ok(Arc::new(CommandExecutor::new(command.clone())?)),
        ExecutorConfig::Http(http) => Ok(Arc::new(HttpExecutor::new(http.clone())?)),
    }
}

/// Truncate captured output to at most `max_bytes`, on a char boundary.
pub(crate) fn truncate_output(mut output: String, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output;
    }

    let mut cut = max_bytes;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    output.truncate(cut);
    output.push_str("\n[output truncated]");
    output
}
