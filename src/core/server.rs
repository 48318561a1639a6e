//! Chat server assembly and lifecycle management.
//!
//! Wires the discovery session manager, the shared tool cache, the model
//! client, the chat pipeline and the health aggregator together. The tool
//! cache is shared by chat requests and health checks, so a health check
//! never forces a refetch of a fresh tool set.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::config::Config;
use super::error::Result;
#[cfg(feature = "http")]
use super::transport::HttpTransport;
use crate::domains::chat::{
    ChatCompletion, ChatError, ChatRequest, ChatResponse, ChatService, HealthAggregator,
    HealthReport, OpenAiChatClient, PublicSettings,
};
use crate::domains::discovery::{
    CachePolicy, CacheStatus, ClientLifecycleManager, DiscoveryConnector, McpConnector, ToolCache,
};

/// The chat server.
pub struct ChatServer<C: DiscoveryConnector = McpConnector> {
    /// Server configuration.
    config: Arc<Config>,

    /// Owner of the live discovery session.
    lifecycle: Arc<ClientLifecycleManager<C>>,

    /// Tool set shared by chat and health.
    tools: Arc<ToolCache<C>>,

    chat: ChatService<C>,

    health: HealthAggregator<C>,
}

impl ChatServer<McpConnector> {
    /// Create a chat server talking to the configured MCP and model endpoints.
    pub fn new(config: Config) -> Result<Self> {
        let lifecycle = Arc::new(ClientLifecycleManager::new(
            McpConnector,
            config.discovery.url.clone(),
        ));
        let model = Arc::new(OpenAiChatClient::new(&config.model, lifecycle.clone())?);
        Ok(Self::assemble(config, lifecycle, model))
    }
}

impl<C: DiscoveryConnector> ChatServer<C> {
    /// Create a chat server from an arbitrary discovery connector and model.
    pub fn with_parts(config: Config, connector: C, model: Arc<dyn ChatCompletion>) -> Self {
        let lifecycle = Arc::new(ClientLifecycleManager::new(
            connector,
            config.discovery.url.clone(),
        ));
        Self::assemble(config, lifecycle, model)
    }

    fn assemble(
        config: Config,
        lifecycle: Arc<ClientLifecycleManager<C>>,
        model: Arc<dyn ChatCompletion>,
    ) -> Self {
        let tools = Arc::new(ToolCache::new(
            Arc::clone(&lifecycle),
            CachePolicy::from(&config.discovery),
        ));
        let chat = ChatService::new(Arc::clone(&tools), Arc::clone(&model), &config);
        let health = HealthAggregator::new(Arc::clone(&tools), model, &config);

        Self {
            config: Arc::new(config),
            lifecycle,
            tools,
            chat,
            health,
        }
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.server.name
    }

    /// Get the server version.
    pub fn version(&self) -> &str {
        &self.config.server.version
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Connection settings with the API key masked.
    pub fn settings(&self) -> &PublicSettings {
        self.health.settings()
    }

    pub fn tool_cache_status(&self) -> CacheStatus {
        self.tools.status()
    }

    /// Run one chat turn, returning the failure for status mapping.
    #[instrument(skip_all)]
    pub async fn chat(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> std::result::Result<ChatResponse, (ChatError, ChatResponse)> {
        match self.chat.chat(request, cancel).await {
            Ok(answer) => Ok(answer.into()),
            Err(e) => {
                let response = self.chat.error_response(&e);
                Err((e, response))
            }
        }
    }

    pub async fn check_health(&self, cancel: &CancellationToken) -> HealthReport {
        self.health.check(cancel).await
    }

    /// Close the discovery session. Safe to call more than once.
    pub async fn shutdown(&self) {
        info!("Shutting down {}", self.name());
        self.lifecycle.shutdown().await;
    }
}

/// Build a server from `config` and serve it over HTTP until Ctrl-C.
#[cfg(feature = "http")]
pub async fn serve(config: Config) -> Result<()> {
    info!("Listener: {}", config.http.description());
    let transport = HttpTransport::new(config.http.clone());
    let server = Arc::new(ChatServer::new(config)?);
    info!("Server initialized");

    transport.run(server).await?;
    Ok(())
}
