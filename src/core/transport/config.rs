//! HTTP listener configuration.

use serde::{Deserialize, Serialize};

use crate::core::config::ConfigError;

pub const ENV_HTTP_HOST: &str = "CHAT_HTTP_HOST";
pub const ENV_HTTP_PORT: &str = "CHAT_HTTP_PORT";
pub const ENV_HTTP_CORS: &str = "CHAT_HTTP_CORS";

/// HTTP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Port number to listen on.
    pub port: u16,

    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Enable CORS for browser clients.
    #[serde(default = "default_cors")]
    pub enable_cors: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_cors() -> bool {
    true
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: default_host(),
            enable_cors: default_cors(),
        }
    }
}

impl HttpConfig {
    /// Create an HTTP config listening on the given address.
    pub fn new(port: u16, host: impl Into<String>) -> Self {
        Self {
            port,
            host: host.into(),
            ..Default::default()
        }
    }

    /// Load the listener settings from a key lookup.
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup(ENV_HTTP_PORT) {
            None => 8080,
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber {
                    field: ENV_HTTP_PORT,
                    value: raw,
                })?,
        };
        let host = lookup(ENV_HTTP_HOST).unwrap_or_else(default_host);
        let enable_cors = lookup(ENV_HTTP_CORS)
            .map(|v| v.to_lowercase() != "false" && v != "0")
            .unwrap_or(true);

        Ok(Self {
            port,
            host,
            enable_cors,
        })
    }

    /// Get a description of this listener for logging.
    pub fn description(&self) -> String {
        format!("HTTP on {}:{}", self.host, self.port)
    }

    /// Get the bind address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let config = HttpConfig::from_lookup(&|_: &str| None).unwrap();
        assert_eq!(config.address(), "127.0.0.1:8080");
        assert!(config.enable_cors);
    }

    #[test]
    fn test_cors_disabled() {
        let config = HttpConfig::from_lookup(&|key: &str| {
            (key == ENV_HTTP_CORS).then(|| "false".to_string())
        })
        .unwrap();
        assert!(!config.enable_cors);
    }

    #[test]
    fn test_invalid_port() {
        let err = HttpConfig::from_lookup(&|key: &str| {
            (key == ENV_HTTP_PORT).then(|| "eighty".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { field: ENV_HTTP_PORT, .. }));
    }
}
