//! Remote runner executor
//!
//! Hands the action to a remote runner over HTTP: `POST {url}` with
//! `{"target": ..., "action": ...}`. A 2xx response whose body is an
//! [`ExecutionResult`] is taken as-is; any other 2xx body counts as success
//! with the body as output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use super::{truncate_output, ExecutionResult, Executor};
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_output_bytes() -> usize {
    64 * 1024
}

pub struct HttpExecutor {
    client: reqwest::Client,
    url: Url,
    bearer_token: Option<String>,
    max_output_bytes: usize,
}

impl HttpExecutor {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("Invalid executor url '{}': {}", config.url, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Executor url must be http or https, got '{}'",
                url.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url,
            bearer_token: config.bearer_token,
            max_output_bytes: config.max_output_bytes,
        })
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, target: &str, action: &str) -> ExecutionResult {
        info!(%target, %action, url = %self.url, "Dispatching remediation to remote runner");

        let mut request = self
            .client
            .post(self.url.clone())
            .json(&json!({ "target": target, "action": action }));

        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Remote runner request failed: {}", e);
                return ExecutionResult::failure("", format!("Request to remote runner failed: {}", e));
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return ExecutionResult::failure("", format!("Failed to read runner response: {}", e)),
        };

        if !status.is_success() {
            return ExecutionResult::failure(
                truncate_output(body, self.max_output_bytes),
                format!("Remote runner returned {}", status),
            );
        }

        match serde_json::from_str::<ExecutionResult>(&body) {
            Ok(mut result) => {
                result.output = truncate_output(result.output, self.max_output_bytes);
                result
            }
            Err(_) => ExecutionResult::success(truncate_output(body, self.max_output_bytes)),
        }
    }
}
