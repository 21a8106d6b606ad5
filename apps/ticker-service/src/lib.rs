#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Ticker Service - Live Tick Ingestion and Subscription Manager
//!
//! Keeps one streaming connection to the brokerage ticker, replays the
//! durable subscription set whenever it connects, caches the latest tick per
//! instrument and serves subscriptions, ticks and depth over HTTP.
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: pure types and rules
//!   - `subscription`: instrument tokens and token sets
//!   - `tick`: tick and depth types, the latest-tick cache
//!   - `credential`: access/public token pair
//!   - `session`: session states, transport events, transition rules
//!
//! - **Application**: use cases and port definitions
//!   - `ports`: transport, store and notifier interfaces
//!   - `services`: the session manager actor and the subscription API
//!
//! - **Infrastructure**: adapters
//!   - `ticker`: WebSocket transport
//!   - `persistence`: SQLite and in-memory stores
//!   - `http`: axum routes, health and metrics
//!   - `notify`, `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!  HTTP ──► TickerService ──► SessionHandle ──► SessionManager ──► WsTickerTransport ──► venue
//!               │                                     ▲                    │
//!               ▼                                     └── TransportEvent ──┘
//!          SQLite store                                        │
//!                                                              ▼
//!  HTTP ◄──────────────────────────────────────────────── TickCache
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::credential::Credential;
pub use domain::session::{SessionState, TransportError, TransportErrorKind, TransportEvent};
pub use domain::subscription::InstrumentToken;
pub use domain::tick::{Depth, DepthLevel, Tick, TickCache};

// Application services
pub use application::error::{ServiceError, SessionError};
pub use application::services::{
    SessionConfig, SessionHandle, SessionManager, SessionSnapshot, TickerService,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, ServiceConfig};

// HTTP server
pub use infrastructure::http::{AppState, HttpServer, HttpServerError, build_router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
