//! Scripted chat-completion backend for tests.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::completion::{ChatCompletion, Completion};
use super::error::ModelError;
use super::model::ChatMessage;
use crate::core::config::Config;
use crate::domains::discovery::RequestOptions;

pub const MODEL_ENDPOINT: &str = "https://models.example.com";
pub const DISCOVERY_URL: &str = "http://dab:5000/mcp";

/// Valid configuration with small limits, optionally in development mode.
pub fn test_config(development: bool) -> Config {
    Config::from_lookup(|key| {
        let value = match key {
            "CHAT_MODEL_ENDPOINT" => MODEL_ENDPOINT,
            "CHAT_MODEL" => "gpt-4o-mini",
            "CHAT_MODEL_API_KEY" => "sk-test-0123456789",
            "CHAT_DISCOVERY_URL" => DISCOVERY_URL,
            "CHAT_MAX_MESSAGES" => "4",
            "CHAT_MAX_TOTAL_CHARS" => "100",
            "CHAT_HEALTH_TIMEOUT_SECS" => "2",
            "CHAT_TOOL_FETCH_TIMEOUT_SECS" => "5",
            "CHAT_ENVIRONMENT" if development => "development",
            _ => return None,
        };
        Some(value.to_string())
    })
    .expect("test configuration is valid")
}

pub struct ScriptedModel {
    pub calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub panic_on_respond: AtomicBool,
    response: Mutex<Result<Completion, ModelError>>,
    models: Mutex<Result<Vec<String>, ModelError>>,
    models_delay: Mutex<Duration>,
    last_messages: Mutex<Vec<ChatMessage>>,
    last_tool_count: AtomicUsize,
}

impl ScriptedModel {
    /// A model that answers `text` and advertises `gpt-4o-mini`.
    pub fn answering(text: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            panic_on_respond: AtomicBool::new(false),
            response: Mutex::new(Ok(Completion {
                text: Some(text.to_string()),
                tool_rounds: 0,
            })),
            models: Mutex::new(Ok(vec!["gpt-4o-mini".to_string()])),
            models_delay: Mutex::new(Duration::ZERO),
            last_messages: Mutex::new(Vec::new()),
            last_tool_count: AtomicUsize::new(0),
        }
    }

    pub fn set_response(&self, response: Result<Completion, ModelError>) {
        *self.response.lock().unwrap() = response;
    }

    pub fn set_models(&self, models: Result<Vec<String>, ModelError>) {
        *self.models.lock().unwrap() = models;
    }

    pub fn set_models_delay(&self, delay: Duration) {
        *self.models_delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages.lock().unwrap().clone()
    }

    pub fn last_tool_count(&self) -> usize {
        self.last_tool_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatCompletion for ScriptedModel {
    async fn respond(
        &self,
        messages: &[ChatMessage],
        options: &RequestOptions,
        _cancel: &CancellationToken,
    ) -> Result<Completion, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_respond.load(Ordering::SeqCst) {
            panic!("model client bug");
        }
        *self.last_messages.lock().unwrap() = messages.to_vec();
        self.last_tool_count
            .store(options.tools.len(), Ordering::SeqCst);
        self.response.lock().unwrap().clone()
    }

    async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.models_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.models.lock().unwrap().clone()
    }
}
