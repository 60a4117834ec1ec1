use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::PulseBotError;

fn default_telegram_bot_token() -> String {
    String::new()
}
fn default_history_capacity() -> usize {
    50
}
fn default_user_ttl_days() -> u64 {
    90
}
fn default_message_ttl_days() -> u64 {
    30
}
fn default_stats_ttl_days() -> u64 {
    7
}
fn default_message_text_cap() -> usize {
    500
}
fn default_broadcast_batch() -> usize {
    50
}
fn default_daily_command_budget() -> u64 {
    10_000
}
fn default_store_timeout_secs() -> u64 {
    5
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_telegram_bot_token")]
    pub telegram_bot_token: String,
    /// Key/value store URL. Absent means the bot runs in degraded mode
    /// with all storage-backed features disabled.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// The single administrator identifier. Absent means admin-only
    /// commands are refused for everyone.
    #[serde(default)]
    pub admin_id: Option<String>,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_user_ttl_days")]
    pub user_ttl_days: u64,
    #[serde(default = "default_message_ttl_days")]
    pub message_ttl_days: u64,
    #[serde(default = "default_stats_ttl_days")]
    pub stats_ttl_days: u64,
    #[serde(default = "default_message_text_cap")]
    pub message_text_cap: usize,
    #[serde(default = "default_broadcast_batch")]
    pub broadcast_batch: usize,
    #[serde(default = "default_daily_command_budget")]
    pub daily_command_budget: u64,
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
}

impl Config {
    pub fn resolve_config_path() -> Result<Option<PathBuf>, PulseBotError> {
        if let Ok(custom) = std::env::var("PULSEBOT_CONFIG") {
            if std::path::Path::new(&custom).exists() {
                return Ok(Some(PathBuf::from(custom)));
            }
            return Err(PulseBotError::Config(format!(
                "PULSEBOT_CONFIG points to non-existent file: {custom}"
            )));
        }
        if std::path::Path::new("./pulsebot.config.yaml").exists() {
            return Ok(Some(PathBuf::from("./pulsebot.config.yaml")));
        }
        if std::path::Path::new("./pulsebot.config.yml").exists() {
            return Ok(Some(PathBuf::from("./pulsebot.config.yml")));
        }
        Ok(None)
    }

    /// Load from the YAML config file when one exists, otherwise fall
    /// back to pure environment configuration (container deployments
    /// usually run with env vars alone). Environment variables override
    /// file values either way.
    pub fn load() -> Result<Self, PulseBotError> {
        let mut config = match Self::resolve_config_path()? {
            Some(path) => {
                let shown = path.display().to_string();
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    PulseBotError::Config(format!("Failed to read {shown}: {e}"))
                })?;
                serde_yaml::from_str::<Config>(&content).map_err(|e| {
                    PulseBotError::Config(format!("Failed to parse {shown}: {e}"))
                })?
            }
            None => serde_yaml::from_str::<Config>("{}")
                .map_err(|e| PulseBotError::Config(e.to_string()))?,
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("BOT_TOKEN") {
            if !token.trim().is_empty() {
                self.telegram_bot_token = token.trim().to_string();
            }
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            if !url.trim().is_empty() {
                self.redis_url = Some(url.trim().to_string());
            }
        }
        if let Ok(admin) = std::env::var("ADMIN_ID") {
            if !admin.trim().is_empty() {
                self.admin_id = Some(admin.trim().to_string());
            }
        }
    }

    fn validate(&self) -> Result<(), PulseBotError> {
        if self.telegram_bot_token.trim().is_empty() {
            return Err(PulseBotError::Config(
                "telegram_bot_token is required (config file or BOT_TOKEN env var)".into(),
            ));
        }
        if self.history_capacity == 0 {
            return Err(PulseBotError::Config(
                "history_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_id.as_deref() == Some(user_id)
    }

    /// Defaults plus a dummy token; for tests only.
    pub fn test_defaults() -> Self {
        let mut config: Config = serde_yaml::from_str("{}").expect("defaults deserialize");
        config.telegram_bot_token = "test-token".into();
        config
    }
}
