//! MCP Chat Server Library
//!
//! A chat backend that answers questions with an OpenAI-compatible model,
//! giving the model the tools advertised by an MCP discovery service.
//!
//! # Architecture
//!
//! - **core**: configuration, error handling, clock, server assembly and the HTTP transport
//! - **domains**: business logic organized by bounded contexts
//!   - **discovery**: MCP session lifecycle and the tool-set cache
//!   - **chat**: request validation, the model client and health checks
//!
//! # Example
//!
//! ```rust,no_run
//! use mcp_chat_server::core::{Config, serve};
//!
//! #[tokio::main]
//! async fn main() -> mcp_chat_server::Result<()> {
//!     let config = Config::from_env()?;
//!     serve(config).await
//! }
//! ```

pub mod core;
pub mod domains;

// Re-export commonly used types for convenience
pub use core::{ChatServer, Config, Error, Result};
