//! Tool-discovery transport.
//!
//! The cache and lifecycle manager only see the two capability traits below.
//! [`McpConnector`] is the production implementation, speaking MCP over
//! streamable HTTP.

use async_trait::async_trait;
use rmcp::{
    RoleClient, ServiceExt,
    model::{CallToolRequestParam, CallToolResult, JsonObject, Tool},
    service::{Peer, RunningService},
    transport::StreamableHttpClientTransport,
};
use std::borrow::Cow;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::error::DiscoveryError;

/// Opens sessions against a tool-discovery endpoint.
#[async_trait]
pub trait DiscoveryConnector: Send + Sync + 'static {
    type Session: DiscoverySession;

    /// Establish a new session.
    async fn connect(&self, endpoint: &str) -> Result<Self::Session, DiscoveryError>;
}

/// A live, possibly stateful session with the discovery service.
#[async_trait]
pub trait DiscoverySession: Send + Sync + 'static {
    /// Fetch the complete tool set, following pagination.
    async fn list_tools(&self) -> Result<Vec<Tool>, DiscoveryError>;

    /// Invoke a tool by name.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, DiscoveryError>;

    /// Tear the session down. Called at most once per session.
    async fn close(&self) -> Result<(), DiscoveryError>;
}

type McpClient = RunningService<RoleClient, ()>;

/// Connects to an MCP server over streamable HTTP.
#[derive(Debug, Clone, Default)]
pub struct McpConnector;

#[async_trait]
impl DiscoveryConnector for McpConnector {
    type Session = McpSession;

    async fn connect(&self, endpoint: &str) -> Result<McpSession, DiscoveryError> {
        let transport = StreamableHttpClientTransport::from_uri(endpoint.to_string());

        let client = ().serve(transport).await.map_err(|e| {
            DiscoveryError::connect(endpoint, format!("initialize streamable client: {}", e))
        })?;

        info!("Connected to MCP server at {}", endpoint);
        Ok(McpSession {
            endpoint: endpoint.to_string(),
            peer: client.peer().clone(),
            client: Mutex::new(Some(client)),
        })
    }
}

/// An initialized MCP client session.
pub struct McpSession {
    endpoint: String,
    peer: Peer<RoleClient>,
    client: Mutex<Option<McpClient>>,
}

#[async_trait]
impl DiscoverySession for McpSession {
    async fn list_tools(&self) -> Result<Vec<Tool>, DiscoveryError> {
        let tools = self
            .peer
            .list_all_tools()
            .await
            .map_err(|e| DiscoveryError::rpc(format!("list tools from {}: {}", self.endpoint, e)))?;
        debug!("Listed {} tools from {}", tools.len(), self.endpoint);
        Ok(tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, DiscoveryError> {
        let request = CallToolRequestParam {
            name: Cow::Owned(name.to_string()),
            arguments,
        };

        self.peer
            .call_tool(request)
            .await
            .map_err(|e| DiscoveryError::ToolCall {
                name: name.to_string(),
                message: e.to_string(),
            })
    }

    async fn close(&self) -> Result<(), DiscoveryError> {
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            client
                .cancel()
                .await
                .map_err(|e| DiscoveryError::Close(e.to_string()))?;
            info!("Disconnected from MCP server at {}", self.endpoint);
        }
        Ok(())
    }
}
