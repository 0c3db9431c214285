use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{
    dispatcher::{ActionMap, DispatcherConfig},
    executor::ExecutorConfig,
    logging::{LogConfig, LogFormat},
    store::{DatabaseConfig, DatabaseType},
    Error, Result,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default = "default_actions")]
    pub actions: ActionMap,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            webhook: WebhookConfig::default(),
            dispatcher: DispatcherConfig::default(),
            actions: default_actions(),
            executor: ExecutorConfig::default(),
            database: DatabaseConfig::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: default_addr() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// When set, `POST /webhook` requires `Authorization: Bearer <token>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Labels consulted, in order, for the remediation target.
    #[serde(default = "default_target_labels")]
    pub target_labels: Vec<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bearer_token: None,
            max_body_bytes: default_max_body_bytes(),
            target_labels: default_target_labels(),
        }
    }
}

fn default_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_target_labels() -> Vec<String> {
    vec!["target".to_string(), "instance".to_string()]
}

fn default_actions() -> ActionMap {
    ActionMap::new().with_action("NginxDown", "restart-nginx")
}

impl Config {
    /// Load configuration: `.env`, then the YAML file if given, then
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Apply environment-style overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("SERVER_ADDR") {
            self.server.addr = addr;
        }

        if let Some(db_type) = lookup("DATABASE_TYPE") {
            self.database.db_type = match db_type.to_lowercase().as_str() {
                "memory" => DatabaseType::Memory,
                "sqlite" => DatabaseType::Sqlite,
                other => return Err(Error::Config(format!("Unknown DATABASE_TYPE '{}'", other))),
            };
        }
        if let Some(path) = lookup("SQLITE_PATH") {
            self.database.sqlite_path = Some(PathBuf::from(path));
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.log.format = LogFormat::from_str(&format)?;
        }

        if let Some(secs) = lookup("COOLDOWN_SECONDS") {
            self.dispatcher.cooldown_secs = parse_number("COOLDOWN_SECONDS", &secs)?;
        }
        if let Some(secs) = lookup("EXECUTOR_TIMEOUT_SECONDS") {
            self.dispatcher.executor_timeout_secs = parse_number("EXECUTOR_TIMEOUT_SECONDS", &secs)?;
        }
        if let Some(feedback) = lookup("RESOLUTION_FEEDBACK") {
            self.dispatcher.resolution_feedback = parse_bool("RESOLUTION_FEEDBACK", &feedback)?;
        }

        if let Some(token) = lookup("WEBHOOK_BEARER_TOKEN") {
            self.webhook.bearer_token = Some(token).filter(|t| !t.is_empty());
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(Error::Config(format!("Invalid server address '{}'", self.server.addr)));
        }

        if self.webhook.target_labels.is_empty() {
            return Err(Error::Config("webhook.target_labels must not be empty".to_string()));
        }
        if self.webhook.max_body_bytes == 0 {
            return Err(Error::Config("webhook.max_body_bytes must be greater than zero".to_string()));
        }

        self.dispatcher.validate().map_err(Error::Config)?;
        self.database.validate().map_err(Error::Config)?;
        self.actions.validate()?;

        Ok(())
    }

    /// Settings that are valid but probably not what the operator meant.
    /// Reported once logging is up.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.actions.is_empty() {
            warnings.push("No actions configured; every alert will be skipped as unmapped".to_string());
        }
        if self.dispatcher.cooldown_secs > self.dispatcher.cooldown().as_secs() {
            warnings.push(format!(
                "dispatcher.cooldown_secs {} exceeds the maximum, using {}",
                self.dispatcher.cooldown_secs,
                self.dispatcher.cooldown().as_secs()
            ));
        }
        warnings
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a non-negative integer, got '{}'", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{} must be a boolean, got '{}'", key, value))),
    }
}
