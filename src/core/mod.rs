//! Core module containing shared infrastructure components.
//!
//! This module provides the foundational building blocks for the chat server,
//! including error handling, configuration, the monotonic clock, server
//! assembly and the transport layer.

pub mod clock;
pub mod config;
pub mod error;
pub mod server;
pub mod transport;

pub use config::{Config, ConfigError};
pub use error::{Error, Result};
pub use server::ChatServer;
#[cfg(feature = "http")]
pub use server::serve;
pub use transport::HttpConfig;
