//! HTTP Server
//!
//! One axum router carries the subscription API, health probes and the
//! Prometheus endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::{handlers, health};
use crate::application::services::TickerService;

/// Shared state for every route.
pub struct AppState {
    pub(super) service: Arc<TickerService>,
    pub(super) version: String,
    pub(super) started_at: Instant,
}

impl AppState {
    /// Create the state.
    #[must_use]
    pub fn new(service: Arc<TickerService>, version: impl Into<String>) -> Self {
        Self {
            service,
            version: version.into(),
            started_at: Instant::now(),
        }
    }
}

/// Build the router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/subscribe", post(handlers::subscribe))
        .route("/unsubscribe", post(handlers::unsubscribe))
        .route("/tick", get(handlers::tick))
        .route("/depth", get(handlers::depth))
        .route("/subscriptions", get(handlers::subscriptions))
        .route("/status", get(handlers::status))
        .route("/set-access-token", post(handlers::set_access_token))
        .route("/provide-access-token", post(handlers::provide_access_token))
        .route("/disconnect", post(handlers::disconnect))
        .route("/health", get(health::health_handler))
        .route("/healthz", get(health::liveness_handler))
        .route("/readyz", get(health::readiness_handler))
        .route("/metrics", get(health::metrics_handler))
        .with_state(state)
}

/// HTTP server bound to one port.
pub struct HttpServer {
    port: u16,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AppState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Serve until cancelled, then drain in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails or the server stops abnormally.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let app = build_router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
