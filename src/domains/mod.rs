//! Domains module containing business logic organized by bounded contexts.
//!
//! - **discovery**: fetching and caching the tool set offered by the MCP service
//! - **chat**: conversation validation, model calls and health checks

pub mod chat;
pub mod discovery;
