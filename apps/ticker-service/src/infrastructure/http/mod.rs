//! HTTP Surface
//!
//! Subscription API, health probes and metrics on a single axum router.

pub mod error;
pub mod handlers;
pub mod health;
mod server;

pub use error::ApiError;
pub use health::{HealthResponse, HealthStatus};
pub use server::{AppState, HttpServer, HttpServerError, build_router};
