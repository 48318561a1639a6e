//! Transport layer for the chat server.
//!
//! The server is exposed over HTTP (feature: `http`, on by default), which
//! adds axum and tower-http. Without the feature the crate is a library only.

mod config;
mod error;

#[cfg(feature = "http")]
pub mod http;

pub use config::HttpConfig;
pub use error::{TransportError, TransportResult};

#[cfg(feature = "http")]
pub use http::{HttpTransport, router};
