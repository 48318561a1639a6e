//! Chat request pipeline.
//!
//! Validates the caller's conversation, prepends the server-authored system
//! prompt, obtains the current tool set from the cache and hands everything to
//! the chat-completion backend. Every failure is converted into a
//! [`ChatResponse`] at this boundary.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::completion::ChatCompletion;
use super::error::{ChatError, ModelError, ValidationError};
use super::model::{Answer, ChatMessage, ChatRequest, ChatResponse, Role};
use crate::core::config::{ChatLimits, Config, Environment};
use crate::domains::discovery::{DiscoveryConnector, McpConnector, ToolCache};

pub const SYSTEM_PROMPT: &str = "\
You are a helpful assistant with access to database tools.
Use the available tools to query the database when users ask about products, categories, inventory, or warehouses.
Always use tools to get real data; never make up answers.
Keep responses concise and formatted clearly.";

/// Roles a caller may never inject.
const CONTROL_ROLES: [&str; 2] = ["system", "thinking"];

fn is_control_role(role: Option<&str>) -> bool {
    role.is_some_and(|r| CONTROL_ROLES.iter().any(|c| r.eq_ignore_ascii_case(c)))
}

pub struct ChatService<C: DiscoveryConnector = McpConnector> {
    tools: Arc<ToolCache<C>>,
    model: Arc<dyn ChatCompletion>,
    limits: ChatLimits,
    model_endpoint: String,
    model_name: String,
    environment: Environment,
}

impl<C: DiscoveryConnector> ChatService<C> {
    pub fn new(tools: Arc<ToolCache<C>>, model: Arc<dyn ChatCompletion>, config: &Config) -> Self {
        Self {
            tools,
            model,
            limits: config.limits,
            model_endpoint: config.model.endpoint.clone(),
            model_name: config.model.model.clone(),
            environment: config.environment,
        }
    }

    /// Validate the conversation and build the message list for the model.
    pub fn prepare_messages(
        &self,
        request: &ChatRequest,
    ) -> Result<Vec<ChatMessage>, ValidationError> {
        if request.messages.is_empty() {
            return Err(ValidationError::EmptyConversation);
        }

        let stripped = request
            .messages
            .iter()
            .filter(|m| is_control_role(m.role.as_deref()))
            .count();
        if stripped > 0 {
            warn!(
                "Stripped {} non-conversation message(s) (system/thinking) from request",
                stripped
            );
        }

        let conversation: Vec<_> = request
            .messages
            .iter()
            .filter(|m| !is_control_role(m.role.as_deref()))
            .collect();

        if conversation.len() > self.limits.max_messages {
            return Err(ValidationError::TooManyMessages {
                count: conversation.len(),
                limit: self.limits.max_messages,
            });
        }

        let total: usize = conversation.iter().map(|m| m.content_chars()).sum();
        if total > self.limits.max_total_chars {
            return Err(ValidationError::CharBudgetExceeded {
                total,
                limit: self.limits.max_total_chars,
            });
        }

        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(ChatMessage::new(Role::System, SYSTEM_PROMPT));

        for message in conversation {
            let role = message.role.as_deref().map(str::trim).unwrap_or_default();
            let role = match role.to_lowercase().as_str() {
                "" => return Err(ValidationError::EmptyRole),
                "user" => Role::User,
                "assistant" => Role::Assistant,
                _ => return Err(ValidationError::UnrecognizedRole(role.to_string())),
            };
            messages.push(ChatMessage::new(
                role,
                message.content.clone().unwrap_or_default(),
            ));
        }

        Ok(messages)
    }

    /// Run one chat turn.
    #[instrument(skip_all, fields(messages = request.messages.len()))]
    pub async fn chat(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<Answer, ChatError> {
        let messages = self.prepare_messages(request)?;

        let snapshot = self.tools.get_current(cancel).await.map_err(|source| {
            warn!(
                "Tool fetch failed for {}: {}",
                self.tools.lifecycle().endpoint(),
                source
            );
            ChatError::ToolDiscovery {
                endpoint: self.tools.lifecycle().endpoint().to_string(),
                source,
            }
        })?;

        let outcome = AssertUnwindSafe(self.model.respond(&messages, snapshot.options(), cancel))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(completion)) => match completion.text {
                Some(text) => Ok(Answer::Text(text)),
                None => {
                    info!(
                        "Model produced only tool calls after {} round(s)",
                        completion.tool_rounds
                    );
                    Ok(Answer::ToolCallsOnly)
                }
            },
            Ok(Err(ModelError::Cancelled)) => {
                warn!("Chat request cancelled while waiting for the model");
                Err(ChatError::unexpected(
                    "Cancelled",
                    "The request was cancelled before the model answered.",
                ))
            }
            Ok(Err(e @ ModelError::InvalidResponse { .. })) => {
                error!("Unexpected response from {}: {}", self.model_endpoint, e);
                Err(ChatError::Unexpected {
                    kind: e.error_type().to_string(),
                    message: e.to_string(),
                    details: None,
                })
            }
            Ok(Err(source)) => {
                error!(
                    "AI model error ({}) from {}/{}: {}",
                    source.error_type(),
                    self.model_endpoint,
                    self.model_name,
                    source
                );
                Err(ChatError::Model {
                    endpoint: self.model_endpoint.clone(),
                    model: self.model_name.clone(),
                    source,
                })
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Unexpected panic in chat completion: {}", message);
                Err(ChatError::Unexpected {
                    kind: "Panic".to_string(),
                    message: "The chat backend failed unexpectedly.".to_string(),
                    details: Some(message),
                })
            }
        }
    }

    /// Run one chat turn and render the outcome for the caller.
    pub async fn respond(&self, request: &ChatRequest, cancel: &CancellationToken) -> ChatResponse {
        match self.chat(request, cancel).await {
            Ok(answer) => answer.into(),
            Err(e) => self.error_response(&e),
        }
    }

    /// Render a failed chat turn for the caller.
    pub fn error_response(&self, error: &ChatError) -> ChatResponse {
        let details = match error {
            ChatError::Unexpected { details, .. } => details.clone(),
            _ => None,
        };
        let debug = self
            .environment
            .is_development()
            .then(|| error_chain(error));

        ChatResponse {
            answer: error.user_message(),
            error: true,
            tool_calls_only: false,
            details,
            debug,
        }
    }
}

/// `error: cause: cause ...`
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut chain = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
