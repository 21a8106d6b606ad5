//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Environment-driven configuration.
pub mod config;

/// HTTP API, health probes and metrics endpoint.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Slack operator alerts.
pub mod notify;

/// Subscription and credential stores.
pub mod persistence;

/// Tracing and OpenTelemetry setup.
pub mod telemetry;

/// Venue WebSocket ticker transport.
pub mod ticker;
