//! Chat error taxonomy.

use thiserror::Error;

use crate::domains::discovery::ToolFetchError;

/// The conversation was rejected before any remote call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No messages provided in request.")]
    EmptyConversation,

    #[error("Conversation too long ({count} messages). Maximum is {limit}. Start a new conversation.")]
    TooManyMessages { count: usize, limit: usize },

    #[error("Conversation exceeds char budget (~{total} chars, max {limit}). Start a new conversation.")]
    CharBudgetExceeded { total: usize, limit: usize },

    #[error("Message has empty role.")]
    EmptyRole,

    #[error("Unrecognized message role: `{0}`. Expected `user` or `assistant`.")]
    UnrecognizedRole(String),
}

/// Failures of the chat-completion endpoint.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Network error reaching {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    #[error("HTTP {status} from {endpoint}: {body}")]
    Http {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("Model request was cancelled")]
    Cancelled,
}

impl ModelError {
    /// Classify a reqwest failure.
    pub fn from_reqwest(endpoint: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                endpoint: endpoint.to_string(),
            }
        } else if let Some(status) = error.status() {
            Self::Http {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: error.to_string(),
            }
        } else {
            Self::Network {
                endpoint: endpoint.to_string(),
                message: error.to_string(),
            }
        }
    }

    pub fn invalid_response(endpoint: &str, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Network { .. } => "NetworkError",
            Self::Http { .. } => "HttpError",
            Self::Timeout { .. } => "Timeout",
            Self::InvalidResponse { .. } => "InvalidResponse",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// Every way a chat request can fail, as seen by the caller.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Cannot reach tool discovery at {endpoint}: {source}")]
    ToolDiscovery {
        endpoint: String,
        #[source]
        source: ToolFetchError,
    },

    #[error("Model '{model}' at {endpoint} failed: {source}")]
    Model {
        endpoint: String,
        model: String,
        #[source]
        source: ModelError,
    },

    #[error("Unexpected {kind}: {message}")]
    Unexpected {
        kind: String,
        message: String,
        details: Option<String>,
    },
}

impl ChatError {
    pub fn unexpected(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unexpected {
            kind: kind.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::ToolDiscovery { .. } => "tool_discovery",
            Self::Model { .. } => "model",
            Self::Unexpected { .. } => "unexpected",
        }
    }

    /// Name of the underlying error variant.
    pub fn error_type(&self) -> &str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::ToolDiscovery { source, .. } => source.error_type(),
            Self::Model { source, .. } => source.error_type(),
            Self::Unexpected { kind, .. } => kind.as_str(),
        }
    }

    /// Markdown message shown to the end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => format!("**ERROR:** {}", e),
            Self::ToolDiscovery { endpoint, source } => format!(
                "**MCP ERROR:** Cannot reach tool discovery at `{}`. Is the service running?\n\n`{}: {}`",
                endpoint,
                source.error_type(),
                source
            ),
            Self::Model {
                endpoint,
                model,
                source,
            } => match source {
                ModelError::Http { status, body, .. } => format!(
                    "**AI MODEL ERROR:** The model at `{}` returned an error.\n\nModel: `{}`\n\n(HTTP {}): {}",
                    endpoint, model, status, body
                ),
                ModelError::Network { message, .. } => format!(
                    "**NETWORK ERROR:** Cannot reach AI endpoint `{}`.\n\n`{}`",
                    endpoint, message
                ),
                ModelError::Timeout { .. } => format!(
                    "**TIMEOUT:** The AI model did not respond in time.\n\nEndpoint: `{}`, Model: `{}`",
                    endpoint, model
                ),
                other => format!(
                    "**AI MODEL ERROR:** `{}`: {}",
                    other.error_type(),
                    other
                ),
            },
            Self::Unexpected { kind, message, .. } => {
                format!("**UNEXPECTED ERROR:** `{}`: {}", kind, message)
            }
        }
    }
}
