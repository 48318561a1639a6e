//! Chat-completion client.
//!
//! [`OpenAiChatClient`] talks to an OpenAI-compatible endpoint and runs the
//! function-invocation loop: tool calls requested by the model are executed
//! through a [`ToolInvoker`] and fed back until the model answers in text or
//! the round limit is reached.

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::ModelError;
use super::model::ChatMessage;
use crate::core::config::ModelConfig;
use crate::domains::discovery::{
    ClientLifecycleManager, DiscoveryConnector, DiscoverySession, RequestOptions,
};

/// Result of one `respond` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Final answer; `None` when the model produced only tool calls.
    pub text: Option<String>,
    /// Number of tool-invocation rounds performed.
    pub tool_rounds: usize,
}

#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Run the conversation against the model with the given tool options.
    async fn respond(
        &self,
        messages: &[ChatMessage],
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<Completion, ModelError>;

    /// Identifiers of the models advertised by the endpoint.
    async fn list_models(&self) -> Result<Vec<String>, ModelError>;
}

/// Executes a tool call on behalf of the model.
///
/// Always yields content for the `tool` message; failures are reported to the
/// model as an error object rather than aborting the chat.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, name: &str, arguments: &str) -> String;
}

fn tool_error(message: impl std::fmt::Display) -> String {
    json!({ "error": message.to_string() }).to_string()
}

#[async_trait]
impl<C: DiscoveryConnector> ToolInvoker for ClientLifecycleManager<C> {
    async fn invoke(&self, name: &str, arguments: &str) -> String {
        let arguments = if arguments.trim().is_empty() {
            None
        } else {
            match serde_json::from_str::<Value>(arguments) {
                Ok(Value::Object(map)) => Some(map),
                Ok(Value::Null) => None,
                Ok(_) => return tool_error("Tool arguments must be a JSON object"),
                Err(e) => return tool_error(format!("Invalid tool arguments: {}", e)),
            }
        };

        let session = match self.get_handle().await {
            Ok(session) => session,
            Err(e) => return tool_error(e),
        };

        match session.call_tool(name, arguments).await {
            Ok(result) => serde_json::to_string(&result).unwrap_or_else(tool_error),
            Err(e) => {
                warn!("Tool execution failed: {}", e);
                tool_error(e)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiChatClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tool_rounds: usize,
    tools: Arc<dyn ToolInvoker>,
}

impl OpenAiChatClient {
    pub fn new(config: &ModelConfig, tools: Arc<dyn ToolInvoker>) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ModelError::from_reqwest(&config.endpoint, e))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_tool_rounds: config.max_tool_rounds,
            tools,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/openai/v1/{}", self.endpoint, path.trim_start_matches('/'))
    }

    async fn complete(
        &self,
        messages: &[Value],
        options: &RequestOptions,
    ) -> Result<AssistantMessage, ModelError> {
        let url = self.api_url("chat/completions");

        let mut body = json!({ "model": self.model, "messages": messages });
        if !options.is_empty() {
            body["tools"] = json!(options.tools);
        }

        let response = self
            .client
            .post(&url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::from_reqwest(&self.endpoint, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ModelError::from_reqwest(&self.endpoint, e))?;

        if !status.is_success() {
            return Err(ModelError::Http {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: CompletionResponse = serde_json::from_str(&text).map_err(|e| {
            ModelError::invalid_response(&self.endpoint, format!("JSON parse error: {}", e))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| ModelError::invalid_response(&self.endpoint, "response has no choices"))
    }

    async fn run(
        &self,
        messages: &[ChatMessage],
        options: &RequestOptions,
    ) -> Result<Completion, ModelError> {
        let mut wire: Vec<Value> = messages.iter().map(ChatMessage::to_wire).collect();

        for round in 0..self.max_tool_rounds {
            let message = self.complete(&wire, options).await?;

            let calls = message.tool_calls.unwrap_or_default();
            if calls.is_empty() {
                let text = message.content.filter(|t| !t.trim().is_empty());
                return Ok(Completion {
                    text,
                    tool_rounds: round,
                });
            }

            debug!(
                "Model requested {} tool call(s) in round {}",
                calls.len(),
                round + 1
            );

            let outputs = join_all(
                calls
                    .iter()
                    .map(|call| self.tools.invoke(&call.function.name, &call.function.arguments)),
            )
            .await;

            wire.push(json!({
                "role": "assistant",
                "content": message.content,
                "tool_calls": calls,
            }));
            for (call, output) in calls.iter().zip(outputs) {
                wire.push(json!({
                    "role": "tool",
                    "tool_call_id": call.id,
                    "content": output,
                }));
            }
        }

        warn!(
            "Model still requesting tools after {} rounds; no final answer",
            self.max_tool_rounds
        );
        Ok(Completion {
            text: None,
            tool_rounds: self.max_tool_rounds,
        })
    }
}

#[async_trait]
impl ChatCompletion for OpenAiChatClient {
    async fn respond(
        &self,
        messages: &[ChatMessage],
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<Completion, ModelError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ModelError::Cancelled),
            result = self.run(messages, options) => result,
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        let url = self.api_url("models");

        let response = self
            .client
            .get(&url)
            .header("api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ModelError::from_reqwest(&self.endpoint, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ModelError::from_reqwest(&self.endpoint, e))?;

        if !status.is_success() {
            return Err(ModelError::Http {
                endpoint: url,
                status: status.as_u16(),
                body: text,
            });
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|_| ModelError::invalid_response(&url, "non-JSON response"))?;

        Ok(model_ids(&body))
    }
}

/// Extract `data[].id` from a `/models` listing.
fn model_ids(body: &Value) -> Vec<String> {
    body.get("data")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
