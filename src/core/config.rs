//! Configuration management for the chat server.
//!
//! Configuration is read from environment variables (optionally seeded from a
//! `.env` file) and validated up front. Any invalid value stops startup with a
//! [`ConfigError`] naming the variable at fault.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use url::Url;

#[cfg(feature = "http")]
use super::transport::HttpConfig;

pub const ENV_MODEL_ENDPOINT: &str = "CHAT_MODEL_ENDPOINT";
pub const ENV_MODEL: &str = "CHAT_MODEL";
pub const ENV_MODEL_API_KEY: &str = "CHAT_MODEL_API_KEY";
pub const ENV_DISCOVERY_URL: &str = "CHAT_DISCOVERY_URL";
pub const ENV_MAX_MESSAGES: &str = "CHAT_MAX_MESSAGES";
pub const ENV_MAX_TOTAL_CHARS: &str = "CHAT_MAX_TOTAL_CHARS";
pub const ENV_TOOL_CACHE_TTL: &str = "CHAT_TOOL_CACHE_TTL_SECS";
pub const ENV_FAILURE_COOLDOWN: &str = "CHAT_TOOL_CACHE_FAILURE_COOLDOWN_SECS";
pub const ENV_TOOL_FETCH_TIMEOUT: &str = "CHAT_TOOL_FETCH_TIMEOUT_SECS";
pub const ENV_HEALTH_TIMEOUT: &str = "CHAT_HEALTH_TIMEOUT_SECS";
pub const ENV_MODEL_TIMEOUT: &str = "CHAT_MODEL_TIMEOUT_SECS";
pub const ENV_MAX_TOOL_ROUNDS: &str = "CHAT_MAX_TOOL_ROUNDS";
pub const ENV_ENVIRONMENT: &str = "CHAT_ENVIRONMENT";
pub const ENV_LOG_LEVEL: &str = "CHAT_LOG_LEVEL";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not configured. Set it as an environment variable.")]
    Missing(&'static str),

    #[error("{0} is empty or whitespace.")]
    Empty(&'static str),

    #[error("{field} is not a valid absolute URL: '{value}'")]
    InvalidUrl { field: &'static str, value: String },

    #[error("{field} must use HTTPS: '{value}'")]
    InsecureUrl { field: &'static str, value: String },

    #[error("{field} is not a valid number: '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("{0} must be greater than zero.")]
    NotPositive(&'static str),

    #[error("{field} has an unknown value: '{value}'")]
    UnknownValue { field: &'static str, value: String },
}

/// Main configuration structure for the chat server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server identification and metadata.
    pub server: ServerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Deployment environment; controls how much error detail reaches callers.
    pub environment: Environment,

    /// Chat-completion model endpoint.
    pub model: ModelConfig,

    /// Tool-discovery service and tool cache policy.
    pub discovery: DiscoveryConfig,

    /// Hard caps on incoming conversations.
    pub limits: ChatLimits,

    /// Health check settings.
    pub health: HealthConfig,

    /// HTTP listener configuration.
    #[cfg(feature = "http")]
    pub http: HttpConfig,
}

/// Server identification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The name of the server.
    pub name: String,

    /// The version of the server.
    pub version: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    pub level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Chat-completion model settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of the model endpoint (HTTPS).
    pub endpoint: String,

    /// Model (deployment) identifier.
    pub model: String,

    /// API key sent with every model request.
    pub api_key: String,

    /// Timeout for a single model round trip.
    pub request_timeout: Duration,

    /// Upper bound on tool-invocation rounds within one chat request.
    pub max_tool_rounds: usize,
}

/// Custom Debug implementation to redact the API key from logs.
impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .field("request_timeout", &self.request_timeout)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish()
    }
}

impl ModelConfig {
    /// The API key reduced to its last five characters.
    pub fn masked_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() > 5 {
            let tail: String = chars[chars.len() - 5..].iter().collect();
            format!("...{}", tail)
        } else {
            "***".to_string()
        }
    }
}

/// Tool-discovery endpoint and cache expiry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// MCP endpoint serving the tool set.
    pub url: String,

    /// How long a successfully fetched tool set is served.
    pub cache_ttl: Duration,

    /// How long a failed fetch suppresses new attempts.
    pub failure_cooldown: Duration,

    /// Upper bound on one tool-set fetch (connect plus listing).
    pub fetch_timeout: Duration,
}

/// Limits applied to each incoming conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChatLimits {
    pub max_messages: usize,
    pub max_total_chars: usize,
}

impl Default for ChatLimits {
    fn default() -> Self {
        Self {
            max_messages: 50,
            max_total_chars: 100_000,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Upper bound on each health check.
    pub timeout: Duration,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// A `.env` file in the working directory is read first, if present.
    pub fn from_env() -> crate::core::Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        info!(
            "Configuration loaded: model '{}' at {}, tools from {}",
            config.model.model, config.model.endpoint, config.discovery.url
        );
        Ok(config)
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup(ENV_ENVIRONMENT) {
            None => Environment::Production,
            Some(value) => match value.trim().to_lowercase().as_str() {
                "development" | "dev" => Environment::Development,
                "production" | "prod" => Environment::Production,
                _ => {
                    return Err(ConfigError::UnknownValue {
                        field: ENV_ENVIRONMENT,
                        value,
                    });
                }
            },
        };

        let config = Self {
            server: ServerConfig {
                name: "mcp-chat-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            logging: LoggingConfig {
                level: lookup(ENV_LOG_LEVEL).unwrap_or_else(|| "info".to_string()),
            },
            environment,
            model: ModelConfig {
                endpoint: required(&lookup, ENV_MODEL_ENDPOINT)?,
                model: required(&lookup, ENV_MODEL)?,
                api_key: required(&lookup, ENV_MODEL_API_KEY)?,
                request_timeout: seconds(&lookup, ENV_MODEL_TIMEOUT, 120)?,
                max_tool_rounds: number(&lookup, ENV_MAX_TOOL_ROUNDS, 8)?,
            },
            discovery: DiscoveryConfig {
                url: required(&lookup, ENV_DISCOVERY_URL)?,
                cache_ttl: seconds(&lookup, ENV_TOOL_CACHE_TTL, 300)?,
                failure_cooldown: seconds(&lookup, ENV_FAILURE_COOLDOWN, 10)?,
                fetch_timeout: seconds(&lookup, ENV_TOOL_FETCH_TIMEOUT, 30)?,
            },
            limits: ChatLimits {
                max_messages: number(&lookup, ENV_MAX_MESSAGES, 50)?,
                max_total_chars: number(&lookup, ENV_MAX_TOTAL_CHARS, 100_000)?,
            },
            health: HealthConfig {
                timeout: seconds(&lookup, ENV_HEALTH_TIMEOUT, 30)?,
            },
            #[cfg(feature = "http")]
            http: HttpConfig::from_lookup(&lookup)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check every value the core depends on.
    ///
    /// Run by [`Config::from_lookup`]; call it directly when building a
    /// `Config` by hand.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = parse_url(ENV_MODEL_ENDPOINT, &self.model.endpoint)?;
        if endpoint.scheme() != "https" {
            return Err(ConfigError::InsecureUrl {
                field: ENV_MODEL_ENDPOINT,
                value: self.model.endpoint.clone(),
            });
        }
        parse_url(ENV_DISCOVERY_URL, &self.discovery.url)?;

        non_blank(ENV_MODEL, &self.model.model)?;
        non_blank(ENV_MODEL_API_KEY, &self.model.api_key)?;

        positive_duration(ENV_MODEL_TIMEOUT, self.model.request_timeout)?;
        positive_duration(ENV_TOOL_CACHE_TTL, self.discovery.cache_ttl)?;
        positive_duration(ENV_FAILURE_COOLDOWN, self.discovery.failure_cooldown)?;
        positive_duration(ENV_TOOL_FETCH_TIMEOUT, self.discovery.fetch_timeout)?;
        positive_duration(ENV_HEALTH_TIMEOUT, self.health.timeout)?;

        if self.model.max_tool_rounds == 0 {
            return Err(ConfigError::NotPositive(ENV_MAX_TOOL_ROUNDS));
        }
        if self.limits.max_messages == 0 {
            return Err(ConfigError::NotPositive(ENV_MAX_MESSAGES));
        }
        if self.limits.max_total_chars == 0 {
            return Err(ConfigError::NotPositive(ENV_MAX_TOTAL_CHARS));
        }

        Ok(())
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or(ConfigError::Missing(key))?;
    non_blank(key, &value)?;
    Ok(value.trim().to_string())
}

fn number<F>(lookup: &F, key: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber {
                field: key,
                value: raw,
            }),
    }
}

fn seconds<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = number(lookup, key, default as usize)?;
    Ok(Duration::from_secs(secs as u64))
}

fn non_blank(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Empty(field))
    } else {
        Ok(())
    }
}

fn positive_duration(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        Err(ConfigError::NotPositive(field))
    } else {
        Ok(())
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    non_blank(field, value)?;
    let url = Url::parse(value).map_err(|_| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
        }),
    }
}
