//! Immutable tool-set snapshots and the request options derived from them.

use chrono::{DateTime, Utc};
use rmcp::model::Tool;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

/// One function declaration in the model request's `tools` array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionDeclaration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

impl From<&Tool> for FunctionTool {
    fn from(tool: &Tool) -> Self {
        Self {
            kind: "function",
            function: FunctionDeclaration {
                name: tool.name.to_string(),
                description: tool.description.as_ref().map(|d| d.to_string()),
                parameters: Value::Object(tool.input_schema.as_ref().clone()),
            },
        }
    }
}

/// Options attached to every model request, precomputed from the tool set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestOptions {
    pub tools: Vec<FunctionTool>,
}

impl RequestOptions {
    pub fn from_tools(tools: &[Tool]) -> Self {
        Self {
            tools: tools.iter().map(FunctionTool::from).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// The tool set as of one successful refresh.
///
/// Never mutated after construction; readers share it through an `Arc`.
#[derive(Debug)]
pub struct ToolSetSnapshot {
    tools: Vec<Tool>,
    options: RequestOptions,
    fetched_at: Instant,
    fetched_at_wall: DateTime<Utc>,
}

impl ToolSetSnapshot {
    /// Build a snapshot. `fetched_at` must be read after the fetch completed.
    pub fn new(tools: Vec<Tool>, fetched_at: Instant) -> Self {
        let options = RequestOptions::from_tools(&tools);
        Self {
            tools,
            options,
            fetched_at,
            fetched_at_wall: Utc::now(),
        }
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// Monotonic instant the snapshot was obtained; drives expiry.
    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// Wall-clock time of the fetch, for display only.
    pub fn fetched_at_wall(&self) -> DateTime<Utc> {
        self.fetched_at_wall
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
