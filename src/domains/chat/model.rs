//! Chat request/response types.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Incoming chat request as posted by the frontend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessageDto>,
}

/// One caller-supplied message. Role and content are taken as-is and
/// validated by the chat service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageDto {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatMessageDto {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            content: Some(content.into()),
        }
    }

    pub fn content_chars(&self) -> usize {
        self.content.as_deref().map_or(0, |c| c.chars().count())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A message ready to be sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Chat-completions wire form.
    pub fn to_wire(&self) -> Value {
        json!({ "role": self.role.as_str(), "content": self.content })
    }
}

/// A successful chat outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// The model produced a final answer.
    Text(String),
    /// The model only issued tool calls and never produced text.
    ToolCallsOnly,
}

pub const TOOL_CALLS_ONLY_NOTICE: &str = "(Model returned only tool calls; no final answer was generated. Try rephrasing your question.)";

/// Body returned by `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    #[serde(default)]
    pub error: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tool_calls_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<String>,
}

impl From<Answer> for ChatResponse {
    fn from(answer: Answer) -> Self {
        match answer {
            Answer::Text(text) => Self {
                answer: text,
                error: false,
                tool_calls_only: false,
                details: None,
                debug: None,
            },
            Answer::ToolCallsOnly => Self {
                answer: TOOL_CALLS_ONLY_NOTICE.to_string(),
                error: false,
                tool_calls_only: true,
                details: None,
                debug: None,
            },
        }
    }
}
