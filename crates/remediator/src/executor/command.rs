//! Local process executor
//!
//! Runs a configured program (by default `ansible-playbook`) with arguments
//! rendered from the remediation context. The child is killed if the
//! dispatcher gives up on it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{truncate_output, ExecutionResult, Executor};
use crate::{template::CommandTemplate, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_program() -> String {
    "ansible-playbook".to_string()
}

fn default_args() -> Vec<String> {
    vec![
        "-i".to_string(),
        "inventory".to_string(),
        "--limit".to_string(),
        "{{ target }}".to_string(),
        "playbooks/{{ action }}.yml".to_string(),
    ]
}

fn default_max_output_bytes() -> usize {
    64 * 1024
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            working_dir: None,
            env: HashMap::new(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

pub struct CommandExecutor {
    config: CommandConfig,
    template: CommandTemplate,
}

impl CommandExecutor {
    pub fn new(config: CommandConfig) -> Result<Self> {
        let template = CommandTemplate::parse(&config.program, &config.args)?;
        Ok(Self { config, template })
    }

    fn format_output(&self, stdout: &[u8], stderr: &[u8]) -> String {
        let stdout = String::from_utf8_lossy(stdout);
        let stderr = String::from_utf8_lossy(stderr);

        let mut output = stdout.trim_end().to_string();
        if !stderr.trim().is_empty() {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str("--- stderr ---\n");
            output.push_str(stderr.trim_end());
        }

        truncate_output(output, self.config.max_output_bytes)
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    async fn execute(&self, target: &str, action: &str) -> ExecutionResult {
        let (program, args) = match self.template.render(&json!({ "target": target, "action": action })) {
            Ok(rendered) => rendered,
            Err(e) => return ExecutionResult::failure("", e.to_string()),
        };

        info!(%target, %action, %program, "Running remediation command");
        debug!("Command arguments: {:?}", args);

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) => {
                warn!(%program, "Failed to spawn remediation command: {}", e);
                return ExecutionResult::failure("", format!("Failed to spawn '{}': {}", program, e));
            }
        };

        let captured = self.format_output(&output.stdout, &output.stderr);

        if output.status.success() {
            ExecutionResult::success(captured)
        } else {
            ExecutionResult::failure(captured, format!("'{}' exited with {}", program, output.status))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> CommandExecutor {
        CommandExecutor::new(CommandConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn successful_command_captures_stdout() {
        let executor = shell("echo {{ action }} on {{ target }}");
        let result = executor.execute("web1", "restart-nginx").await;

        assert!(result.success);
        assert_eq!(result.output, "restart-nginx on web1");
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_failure_with_output() {
        let executor = shell("echo partial; echo boom >&2; exit 3");
        let result = executor.execute("web1", "restart-nginx").await;

        assert!(!result.success);
        assert!(result.output.contains("partial"));
        assert!(result.output.contains("--- stderr ---\nboom"));
        assert!(result.error.unwrap().contains("exited with"));
    }

    #[tokio::test]
    async fn missing_program_is_a_failure() {
        let executor = CommandExecutor::new(CommandConfig {
            program: "/nonexistent/ansible-playbook".to_string(),
            args: vec![],
            ..Default::default()
        })
        .unwrap();

        let result = executor.execute("web1", "restart-nginx").await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Failed to spawn"));
    }

    #[tokio::test]
    async fn env_and_working_dir_are_applied() {
        let dir = std::env::temp_dir();
        let executor = CommandExecutor::new(CommandConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "echo $PLAYBOOK_USER; pwd".to_string()],
            working_dir: Some(dir.clone()),
            env: HashMap::from([("PLAYBOOK_USER".to_string(), "ansible".to_string())]),
            ..Default::default()
        })
        .unwrap();

        let result = executor.execute("web1", "restart-nginx").await;
        assert!(result.success);
        let mut lines = result.output.lines();
        assert_eq!(lines.next(), Some("ansible"));
        assert!(lines.next().is_some());
    }

    #[tokio::test]
    async fn output_is_truncated() {
        let executor = CommandExecutor::new(CommandConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "printf 'x%.0s' $(seq 1 100)".to_string()],
            max_output_bytes: 10,
            ..Default::default()
        })
        .unwrap();

        let result = executor.execute("web1", "restart-nginx").await;
        assert!(result.success);
        assert!(result.output.starts_with("xxxxxxxxxx\n[output truncated]"));
    }
}
