//! Configuration loading, validation, and management for AgroCert.
//!
//! Loads configuration from a TOML file with environment variable
//! overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `agrocert.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Anthropic API key (usually provided via `ANTHROPIC_API_KEY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model to use for conversations
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Conversation engine configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// History truncation configuration
    #[serde(default)]
    pub history: HistoryConfig,
}

fn default_model() -> String {
    "claude-sonnet-4-5".into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    1.0
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("database", &self.database)
            .field("gateway", &self.gateway)
            .field("agent", &self.agent)
            .field("history", &self.history)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL (usually provided via `DATABASE_URL`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Pool acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_min_connections() -> u32 {
    2
}
fn default_max_connections() -> u32 {
    10
}
fn default_acquire_timeout() -> u64 {
    60
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &redact(&self.url))
            .field("min_connections", &self.min_connections)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Origins allowed by CORS (empty = same-origin only)
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_port() -> u16 {
    8090
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origins: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum tool-use loop iterations per conversation turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// How many stored messages to load per turn
    #[serde(default = "default_history_limit")]
    pub history_limit: i64,
}

fn default_max_iterations() -> u32 {
    5
}
fn default_history_limit() -> i64 {
    50
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Token budget for conversation history
    #[serde(default = "default_context_budget")]
    pub max_context_tokens: usize,

    /// Recent messages always retained during truncation
    #[serde(default = "default_keep_most_recent")]
    pub keep_most_recent: usize,

    /// Message count beyond which older history is summarized
    #[serde(default = "default_summary_threshold")]
    pub summary_threshold: usize,
}

fn default_context_budget() -> usize {
    150_000
}
fn default_keep_most_recent() -> usize {
    10
}
fn default_summary_threshold() -> usize {
    50
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_context_budget(),
            keep_most_recent: default_keep_most_recent(),
            summary_threshold: default_summary_threshold(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the given path (or `agrocert.toml` when
    /// absent), then apply environment variable overrides:
    /// - `ANTHROPIC_API_KEY` — API key
    /// - `DATABASE_URL` — PostgreSQL connection URL
    /// - `AGROCERT_MODEL` — model override
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load_from(Path::new("agrocert.toml"))?,
        };

        if config.api_key.is_none() {
            config.api_key = std::env::var("ANTHROPIC_API_KEY").ok();
        }
        if config.database.url.is_none() {
            config.database.url = std::env::var("DATABASE_URL").ok();
        }
        if let Ok(model) = std::env::var("AGROCERT_MODEL") {
            config.model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }
        if self.history.keep_most_recent == 0 {
            return Err(ConfigError::ValidationError(
                "history.keep_most_recent must be at least 1".into(),
            ));
        }
        if self.database.max_connections < self.database.min_connections {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be >= min_connections".into(),
            ));
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            database: DatabaseConfig::default(),
            gateway: GatewayConfig::default(),
            agent: AgentConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.model, "claude-sonnet-4-5");
        assert_eq!(config.gateway.port, 8090);
        assert_eq!(config.agent.max_iterations, 5);
        assert_eq!(config.history.keep_most_recent, 10);
        config.validate().unwrap();
    }

    #[test]
    fn parse_partial_toml() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
model = "claude-opus-4"

[gateway]
port = 9000

[history]
max_context_tokens = 50000
"#
        )
        .unwrap();

        let config = AppConfig::load_from(f.path()).unwrap();
        assert_eq!(config.model, "claude-opus-4");
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.history.max_context_tokens, 50000);
        // Unspecified sections fall back to defaults
        assert_eq!(config.agent.max_iterations, 5);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "temperature = 3.5").unwrap();
        let err = AppConfig::load_from(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/agrocert.toml")).unwrap();
        assert_eq!(config.model, "claude-sonnet-4-5");
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AppConfig {
            api_key: Some("sk-ant-secret".into()),
            ..AppConfig::default()
        };
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-ant-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }
}
