//! # Configuration Module
//!
//! This module defines configuration structures for the bot: Telegram and
//! backend credentials, completion parameters, recovery settings, history
//! bounds and reading-session expiry.

use anyhow::{anyhow, Context, Result};
use chrono::Duration;

use crate::render::Dialect;

// Constants for bot configuration
pub const DEFAULT_MODEL: &str = "deepseek-r1-distill-llama-70b";
pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_SYSTEM_PROMPT: &str = "使用繁體中文回答";
pub const DEFAULT_IMAGE_BASE_URL: &str = "https://www.sacred-texts.com/tarot/pkt/img";
pub const DEFAULT_MAX_HISTORY_PAIRS: usize = 5;
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Recovery configuration for backend calls
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Timeout for a single completion request in seconds
    pub operation_timeout_secs: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_retry_delay_ms: 1000,  // 1 second
            max_retry_delay_ms: 10000,  // 10 seconds
            operation_timeout_secs: 60, // completions can be slow
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

/// Completion parameters and recovery policy for the chat-completions backend
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Chat-completions endpoint
    pub api_url: String,
    /// Bearer token
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    /// Recovery and error handling configuration
    pub recovery: RecoveryConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            temperature: 0.5,
            max_tokens: 1024,
            top_p: 1.0,
            recovery: RecoveryConfig::default(),
        }
    }
}

/// Top-level bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_token: String,
    /// Allow-list of model identifiers, first entry is the initial model
    pub models: Vec<String>,
    pub system_prompt: String,
    pub max_history_pairs: usize,
    pub session_ttl_minutes: i64,
    pub dialect: Dialect,
    pub image_base_url: String,
    pub backend: BackendConfig,
}

impl BotConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| anyhow!("{key} must be set"))
        };

        let telegram_token = required("TELEGRAM_BOT_TOKEN")?;
        let api_key = required("GROQ_API_KEY")?;

        let models = lookup("GROQ_MODELS")
            .map(|raw| parse_model_list(&raw))
            .filter(|models| !models.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_MODEL.to_string()]);

        let max_history_pairs = match lookup("MAX_HISTORY_PAIRS") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .context("MAX_HISTORY_PAIRS must be a positive integer")?,
            None => DEFAULT_MAX_HISTORY_PAIRS,
        };
        if max_history_pairs == 0 {
            return Err(anyhow!("MAX_HISTORY_PAIRS must be at least 1"));
        }

        let session_ttl_minutes = match lookup("READING_SESSION_TTL_MINUTES") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .context("READING_SESSION_TTL_MINUTES must be an integer")?,
            None => DEFAULT_SESSION_TTL_MINUTES,
        };
        if session_ttl_minutes < 1 {
            return Err(anyhow!("READING_SESSION_TTL_MINUTES must be at least 1"));
        }
        ttl_from_minutes(session_ttl_minutes)?;

        let dialect = match lookup("RENDER_DIALECT") {
            Some(raw) => raw
                .parse::<Dialect>()
                .map_err(|e| anyhow!(e))
                .context("RENDER_DIALECT must be `html` or `markdown`")?,
            None => Dialect::Html,
        };

        let system_prompt = lookup("SYSTEM_PROMPT")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        let image_base_url = lookup("TAROT_IMAGE_BASE_URL")
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE_BASE_URL.to_string());

        let api_url = lookup("GROQ_API_URL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Ok(Self {
            telegram_token,
            models,
            system_prompt,
            max_history_pairs,
            session_ttl_minutes,
            dialect,
            image_base_url,
            backend: BackendConfig {
                api_url,
                api_key,
                ..BackendConfig::default()
            },
        })
    }

    /// Idle time after which an unfinished reading session expires
    pub fn session_ttl(&self) -> Result<Duration> {
        ttl_from_minutes(self.session_ttl_minutes)
    }
}

/// Split a comma-separated model list, dropping blank entries and duplicates
pub fn parse_model_list(raw: &str) -> Vec<String> {
    let mut models: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        if !models.iter().any(|existing| existing == name) {
            models.push(name.to_string());
        }
    }
    models
}

/// Minutes as a `Duration`, rejecting values chrono cannot represent
fn ttl_from_minutes(minutes: i64) -> Result<Duration> {
    Duration::try_minutes(minutes).context("READING_SESSION_TTL_MINUTES is out of range")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_list() {
        assert_eq!(
            parse_model_list(" llama-3.3-70b , ,deepseek-r1,llama-3.3-70b"),
            vec!["llama-3.3-70b".to_string(), "deepseek-r1".to_string()]
        );
        assert!(parse_model_list(" , ").is_empty());
    }

    #[test]
    fn test_recovery_defaults_reasonable() {
        let recovery = RecoveryConfig::default();
        assert!(recovery.max_retries <= 10);
        assert!(recovery.base_retry_delay_ms <= recovery.max_retry_delay_ms);
        assert!(recovery.operation_timeout_secs > 0);
        assert!(recovery.circuit_breaker_threshold > 0);
    }
}
