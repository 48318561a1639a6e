//! Tool-discovery error types.

use std::time::Duration;
use thiserror::Error;

/// Failures reported by the tool-discovery transport.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    /// Could not establish a session with the discovery endpoint.
    #[error("Failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    /// The session was established but listing tools failed.
    #[error("Tool listing failed: {0}")]
    Rpc(String),

    /// A tool invocation failed at the protocol level.
    #[error("Tool '{name}' call failed: {message}")]
    ToolCall { name: String, message: String },

    /// Closing a session failed.
    #[error("Failed to close session: {0}")]
    Close(String),

    /// The lifecycle manager has been shut down.
    #[error("Tool discovery client has been shut down")]
    ShutDown,
}

impl DiscoveryError {
    /// Create a connect error.
    pub fn connect(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create an RPC error.
    pub fn rpc(message: impl Into<String>) -> Self {
        Self::Rpc(message.into())
    }

    /// Short name of the error category.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "ConnectError",
            Self::Rpc(_) => "RpcError",
            Self::ToolCall { .. } => "ToolCallError",
            Self::Close(_) => "CloseError",
            Self::ShutDown => "ShutDown",
        }
    }
}

/// Failures of [`ToolCache::get_current`](super::ToolCache::get_current).
#[derive(Debug, Clone, Error)]
pub enum ToolFetchError {
    /// The refresh reached the transport and failed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// A recent refresh failed and the cooldown has not elapsed.
    #[error(
        "Tool fetch recently failed; retrying after {}s cooldown ({}s remaining)",
        cooldown.as_secs(),
        retry_after.as_secs()
    )]
    CoolingDown {
        cooldown: Duration,
        retry_after: Duration,
    },

    /// The fetch did not complete within the configured timeout.
    #[error("Tool fetch timed out after {}s", timeout.as_secs())]
    Timeout { timeout: Duration },

    /// The caller gave up before the refresh completed.
    #[error("Tool fetch was cancelled")]
    Cancelled,
}

impl ToolFetchError {
    /// Short name of the underlying error, suitable for user-facing messages.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Discovery(e) => e.error_type(),
            Self::CoolingDown { .. } => "CoolingDown",
            Self::Timeout { .. } => "Timeout",
            Self::Cancelled => "Cancelled",
        }
    }
}
