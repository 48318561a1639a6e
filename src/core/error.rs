//! Error types and handling for the chat server.
//!
//! This module defines a unified error type for everything that can stop the
//! server from starting or running. Per-request failures are rendered at the
//! chat boundary and never reach this type.

use thiserror::Error;

use super::config::ConfigError;
use super::transport::TransportError;
use crate::domains::chat::ModelError;

/// A specialized Result type for chat server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the chat server.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The model client could not be built.
    #[error("Model client error: {0}")]
    Model(#[from] ModelError),

    /// Listener failures.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
