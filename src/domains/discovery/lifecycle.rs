//! Ownership of the single live discovery session.
//!
//! The manager lazily opens a session on first use and hands out shared
//! references to it. A session suspected to be stale is swapped out and closed;
//! the close happens after the swap, so a caller opening the replacement
//! session never waits on the teardown of the old one.

use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::DiscoveryError;
use super::transport::{DiscoveryConnector, DiscoverySession};

pub struct ClientLifecycleManager<C: DiscoveryConnector> {
    connector: C,
    endpoint: String,
    current: ArcSwapOption<C::Session>,
    /// Serializes every read-modify-write of `current`.
    lock: Mutex<()>,
    shut_down: AtomicBool,
}

impl<C: DiscoveryConnector> ClientLifecycleManager<C> {
    pub fn new(connector: C, endpoint: impl Into<String>) -> Self {
        Self {
            connector,
            endpoint: endpoint.into(),
            current: ArcSwapOption::empty(),
            lock: Mutex::new(()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Whether a session is currently held.
    pub fn has_session(&self) -> bool {
        self.current.load().is_some()
    }

    /// Return the live session, connecting if there is none.
    ///
    /// A failed connect leaves the manager without a session, so the next
    /// call tries again.
    pub async fn get_handle(&self) -> Result<Arc<C::Session>, DiscoveryError> {
        if let Some(session) = self.current.load_full() {
            return Ok(session);
        }

        let _guard = self.lock.lock().await;

        // Another caller may have connected while we waited.
        if let Some(session) = self.current.load_full() {
            return Ok(session);
        }
        if self.shut_down.load(Ordering::Acquire) {
            return Err(DiscoveryError::ShutDown);
        }

        debug!("Opening discovery session to {}", self.endpoint);
        let session = Arc::new(self.connector.connect(&self.endpoint).await?);
        self.current.store(Some(Arc::clone(&session)));
        Ok(session)
    }

    /// Discard the live session so the next [`get_handle`](Self::get_handle)
    /// reconnects. Idempotent; close failures are logged, never returned.
    pub async fn invalidate(&self) {
        let old = {
            let _guard = self.lock.lock().await;
            self.current.swap(None)
        };

        if let Some(old) = old {
            info!("Invalidated discovery session to {}", self.endpoint);
            self.close_session(old).await;
        }
    }

    /// Close the live session for good. Only the first call has any effect.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let old = {
            let _guard = self.lock.lock().await;
            self.current.swap(None)
        };

        if let Some(old) = old {
            self.close_session(old).await;
        }
        info!("Discovery client for {} shut down", self.endpoint);
    }

    async fn close_session(&self, session: Arc<C::Session>) {
        if let Err(e) = session.close().await {
            warn!(
                "Error closing discovery session to {} (already considered broken): {}",
                self.endpoint, e
            );
        }
    }
}
