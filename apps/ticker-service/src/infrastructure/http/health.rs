//! Health and Metrics Routes
//!
//! - `GET /health` - JSON health report
//! - `GET /healthz` - liveness probe
//! - `GET /readyz` - readiness probe, ready while the ticker is connected
//! - `GET /metrics` - Prometheus text

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::server::AppState;
use crate::application::services::SessionSnapshot;
use crate::domain::session::SessionState;
use crate::infrastructure::metrics::get_metrics_handle;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Ticker session summary.
    pub session: SessionHealth,
    /// Instruments with a cached tick.
    pub cached_instruments: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Ticker connected.
    Healthy,
    /// A session exists but is not connected.
    Degraded,
    /// No session, or the session manager is gone.
    Unhealthy,
}

/// Ticker session summary.
#[derive(Debug, Clone, Serialize)]
pub struct SessionHealth {
    /// Lifecycle state, or "unavailable" when the manager has exited.
    pub state: &'static str,
    /// Whether the transport is connected.
    pub connected: bool,
    /// Whether a usable credential is loaded.
    pub has_credential: bool,
}

pub(super) async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = build_health_response(&state).await;
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

pub(super) async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub(super) async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let connected = state
        .service
        .session()
        .status()
        .await
        .is_ok_and(|snapshot| snapshot.connected);

    if connected {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

pub(super) async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

async fn build_health_response(state: &AppState) -> HealthResponse {
    let snapshot = state.service.session().status().await.ok();

    HealthResponse {
        status: determine_health_status(snapshot.as_ref()),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        session: snapshot.as_ref().map_or(
            SessionHealth {
                state: "unavailable",
                connected: false,
                has_credential: false,
            },
            |s| SessionHealth {
                state: s.state.as_str(),
                connected: s.connected,
                has_credential: s.has_credential,
            },
        ),
        cached_instruments: state.service.cache().len(),
    }
}

fn determine_health_status(snapshot: Option<&SessionSnapshot>) -> HealthStatus {
    match snapshot {
        Some(s) if s.connected => HealthStatus::Healthy,
        Some(s) if s.state != SessionState::Idle => HealthStatus::Degraded,
        _ => HealthStatus::Unhealthy,
    }
}
