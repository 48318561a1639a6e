//! Tool-discovery domain.
//!
//! Fetches the callable tool set from the discovery (MCP) service and keeps it
//! cached so chat requests do not pay a network round trip each time.
//!
//! ## Architecture
//!
//! - `transport.rs` - connector/session capabilities and the MCP implementation
//! - `lifecycle.rs` - owns the single live session, reconnects when it goes stale
//! - `cache.rs` - TTL/cooldown cache with a lock-free read path
//! - `snapshot.rs` - immutable tool set + derived model request options
//! - `error.rs` - discovery error types

mod cache;
mod error;
mod lifecycle;
mod snapshot;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CachePolicy, CacheStatus, ToolCache};
pub use error::{DiscoveryError, ToolFetchError};
pub use lifecycle::ClientLifecycleManager;
pub use snapshot::{FunctionDeclaration, FunctionTool, RequestOptions, ToolSetSnapshot};
pub use transport::{DiscoveryConnector, DiscoverySession, McpConnector, McpSession};
