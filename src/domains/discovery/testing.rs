//! In-memory discovery transport for tests.

use async_trait::async_trait;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::DiscoveryError;
use super::transport::{DiscoveryConnector, DiscoverySession};

/// Counters and switches shared by a [`FakeConnector`] and its sessions.
#[derive(Default)]
pub struct FakeState {
    pub connects: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub tool_calls: AtomicUsize,
    pub fail_connect: AtomicBool,
    pub fail_list: AtomicBool,
    pub fail_close: AtomicBool,
    pub list_delay_ms: AtomicU64,
    pub connect_delay_ms: AtomicU64,
    pub tool_count: AtomicUsize,
    pub closed_sessions: Mutex<Vec<usize>>,
}

impl FakeState {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> Vec<usize> {
        self.closed_sessions.lock().unwrap().clone()
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_list_delay(&self, delay: Duration) {
        self.list_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

pub fn fake_tool(name: &str) -> Tool {
    let schema: JsonObject = serde_json::json!({ "type": "object", "properties": {} })
        .as_object()
        .cloned()
        .unwrap_or_default();
    Tool::new(name.to_string(), format!("Test tool: {}", name), Arc::new(schema))
}

pub struct FakeConnector {
    pub state: Arc<FakeState>,
}

impl FakeConnector {
    /// A connector whose sessions list `tool_count` tools.
    pub fn with_tools(tool_count: usize) -> Self {
        let state = FakeState::default();
        state.tool_count.store(tool_count, Ordering::SeqCst);
        Self {
            state: Arc::new(state),
        }
    }
}

#[async_trait]
impl DiscoveryConnector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self, endpoint: &str) -> Result<FakeSession, DiscoveryError> {
        let id = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.state.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(DiscoveryError::connect(endpoint, "connection refused"));
        }
        Ok(FakeSession {
            id,
            state: Arc::clone(&self.state),
        })
    }
}

pub struct FakeSession {
    pub id: usize,
    state: Arc<FakeState>,
}

#[async_trait]
impl DiscoverySession for FakeSession {
    async fn list_tools(&self) -> Result<Vec<Tool>, DiscoveryError> {
        self.state.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.list_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.state.fail_list.load(Ordering::SeqCst) {
            return Err(DiscoveryError::rpc("connection reset by peer"));
        }
        let count = self.state.tool_count.load(Ordering::SeqCst);
        Ok((0..count).map(|i| fake_tool(&format!("tool_{}", i))).collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        _arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, DiscoveryError> {
        self.state.tool_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CallToolResult::success(vec![Content::text(format!(
            "{} ok",
            name
        ))]))
    }

    async fn close(&self) -> Result<(), DiscoveryError> {
        self.state.closed_sessions.lock().unwrap().push(self.id);
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(DiscoveryError::Close("broken pipe".to_string()));
        }
        Ok(())
    }
}
