//! Chat domain.
//!
//! Turns a caller's conversation into a model answer, using the tool set from
//! the discovery domain.
//!
//! ## Architecture
//!
//! - `service.rs` - validation and the request pipeline
//! - `completion.rs` - chat-completion client and tool invocation loop
//! - `health.rs` - health check aggregation
//! - `model.rs` - request/response types
//! - `error.rs` - validation, model and chat error types

mod completion;
mod error;
mod health;
mod model;
mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use completion::{ChatCompletion, Completion, OpenAiChatClient, ToolInvoker};
pub use error::{ChatError, ModelError, ValidationError};
pub use health::{HealthAggregator, HealthReport, HealthStatus, PublicSettings, ToolsSummary};
pub use model::{
    Answer, ChatMessage, ChatMessageDto, ChatRequest, ChatResponse, Role, TOOL_CALLS_ONLY_NOTICE,
};
pub use service::{ChatService, SYSTEM_PROMPT};
