//! HTTP transport implementation.
//!
//! JSON API consumed by the chat frontend:
//!
//! - `POST /api/chat` - run one chat turn
//! - `GET /api/health` - health report
//! - `GET /api/settings` - connection settings, key masked
//! - `GET /` - service info

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use super::{TransportError, TransportResult, config::HttpConfig};
use crate::core::ChatServer;
use crate::domains::chat::{ChatError, ChatRequest};
use crate::domains::discovery::DiscoveryConnector;

/// HTTP transport handler.
pub struct HttpTransport {
    config: HttpConfig,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given config.
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }

    /// Get the bind address.
    pub fn address(&self) -> String {
        self.config.address()
    }

    /// Serve until Ctrl-C, then close the discovery session.
    pub async fn run<C: DiscoveryConnector>(self, server: Arc<ChatServer<C>>) -> TransportResult<()> {
        let addr = self.address();
        let app = router(Arc::clone(&server), self.config.enable_cors);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::bind(&addr, e))?;

        let cors_status = if self.config.enable_cors {
            "enabled"
        } else {
            "disabled"
        };
        info!("Ready - listening on {} (CORS {})", addr, cors_status);
        info!("  → Chat:     POST /api/chat");
        info!("  → Health:   GET /api/health");
        info!("  → Settings: GET /api/settings");

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        server.shutdown().await;
        served?;
        Ok(())
    }
}

/// Build the API router.
pub fn router<C: DiscoveryConnector>(server: Arc<ChatServer<C>>, enable_cors: bool) -> Router {
    let mut app = Router::new()
        .route("/api/chat", post(chat_handler::<C>))
        .route("/api/health", get(health_handler::<C>))
        .route("/api/settings", get(settings_handler::<C>))
        .route("/", get(root_handler::<C>))
        .layer(TraceLayer::new_for_http())
        .with_state(server);

    if enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
    }
}

fn status_for(error: &ChatError) -> StatusCode {
    match error {
        ChatError::Validation(_) => StatusCode::BAD_REQUEST,
        ChatError::ToolDiscovery { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ChatError::Model { .. } => StatusCode::BAD_GATEWAY,
        ChatError::Unexpected { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Root handler - provides API info.
async fn root_handler<C: DiscoveryConnector>(
    State(server): State<Arc<ChatServer<C>>>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "name": server.name(),
        "version": server.version(),
        "endpoints": {
            "chat": "POST /api/chat",
            "health": "GET /api/health",
            "settings": "GET /api/settings"
        }
    }))
}

#[instrument(skip_all)]
async fn chat_handler<C: DiscoveryConnector>(
    State(server): State<Arc<ChatServer<C>>>,
    Json(request): Json<ChatRequest>,
) -> impl IntoResponse {
    // Cancelled when the client goes away and axum drops this future.
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    match server.chat(&request, &cancel).await {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err((error, response)) => {
            let status = status_for(&error);
            info!(
                "Chat request failed with {} ({}): {}",
                status,
                error.error_type(),
                error
            );
            (status, Json(response))
        }
    }
}

async fn health_handler<C: DiscoveryConnector>(
    State(server): State<Arc<ChatServer<C>>>,
) -> impl IntoResponse {
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    Json(server.check_health(&cancel).await)
}

async fn settings_handler<C: DiscoveryConnector>(
    State(server): State<Arc<ChatServer<C>>>,
) -> impl IntoResponse {
    Json(server.settings().clone())
}
