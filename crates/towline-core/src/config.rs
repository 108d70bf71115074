//! Configuration management for Towline.
//!
//! A TOML file provides the base config; environment variables overlay
//! it, covering deployments that configure everything through the
//! process environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TowlineError};
use crate::provider::BackendConfig;

/// Top-level bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Webhook server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Conversation platform settings.
    #[serde(default)]
    pub chatwoot: ChatwootConfig,

    /// Completion backend settings.
    #[serde(default)]
    pub completion: BackendConfig,

    /// Completion deadline in seconds.
    #[serde(default = "default_completion_timeout")]
    pub completion_timeout_secs: u64,

    /// Operator to assign conversations to on handoff.
    pub operator_assignee_id: Option<i64>,

    /// How long to wait for an operator before the bot resumes.
    #[serde(default = "default_fallback_timeout")]
    pub operator_fallback_secs: u64,

    /// Knowledge-base directory. When set, replies are grounded in
    /// retrieved snippets; when absent, plain completion over history.
    pub knowledge_dir: Option<PathBuf>,

    /// Session state backend selector. Only "memory" is built in.
    #[serde(default = "default_state_provider")]
    pub state_provider: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatwootConfig {
    pub url: String,
    pub account_id: String,
    pub api_token: String,
}

fn default_port() -> u16 {
    5005
}

fn default_completion_timeout() -> u64 {
    15
}

fn default_fallback_timeout() -> u64 {
    3 * 60
}

fn default_state_provider() -> String {
    "memory".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            chatwoot: ChatwootConfig::default(),
            completion: BackendConfig::default(),
            completion_timeout_secs: default_completion_timeout(),
            operator_assignee_id: None,
            operator_fallback_secs: default_fallback_timeout(),
            knowledge_dir: None,
            state_provider: default_state_provider(),
        }
    }
}

impl BotConfig {
    /// Load config from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| TowlineError::Config(format!("Failed to read config: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| TowlineError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Overlay environment variables on top of the loaded config.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("BOT_PORT") {
            self.port = port
                .parse()
                .map_err(|_| TowlineError::Config(format!("Invalid BOT_PORT: {}", port)))?;
        }
        if let Ok(url) = std::env::var("CHATWOOT_URL") {
            self.chatwoot.url = url;
        }
        if let Ok(account) = std::env::var("CHATWOOT_ACCOUNT_ID") {
            self.chatwoot.account_id = account;
        }
        if let Ok(token) = std::env::var("CHATWOOT_API_KEY") {
            self.chatwoot.api_token = token;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.completion.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            self.completion.model = model;
        }
        if let Ok(base) = std::env::var("OPENAI_API_BASE") {
            self.completion.api_base = Some(base);
        }
        if let Ok(id) = std::env::var("OPERATOR_ASSIGNEE_ID") {
            self.operator_assignee_id = Some(id.parse().map_err(|_| {
                TowlineError::Config(format!("Invalid OPERATOR_ASSIGNEE_ID: {}", id))
            })?);
        }
        if let Ok(dir) = std::env::var("KNOWLEDGE_DIR") {
            self.knowledge_dir = Some(PathBuf::from(dir));
        }
        if let Ok(provider) = std::env::var("STATE_PROVIDER") {
            self.state_provider = provider;
        }
        Ok(())
    }

    /// Check that everything required to talk to the outside world is set.
    pub fn validate(&self) -> Result<()> {
        if self.chatwoot.url.is_empty() {
            return Err(TowlineError::Config("chatwoot.url is required".into()));
        }
        if self.chatwoot.account_id.is_empty() {
            return Err(TowlineError::Config("chatwoot.account_id is required".into()));
        }
        if self.chatwoot.api_token.is_empty() {
            return Err(TowlineError::Config("chatwoot.api_token is required".into()));
        }
        if self.completion.api_key.is_none() {
            return Err(TowlineError::Config("completion.api_key is required".into()));
        }
        Ok(())
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("towline")
            .join("config.toml")
    }
}
