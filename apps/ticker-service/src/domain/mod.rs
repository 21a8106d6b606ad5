//! Domain Layer - Core ticker types and session logic.
//!
//! Pure types with no I/O: instrument tokens, credentials, ticks and the
//! session state machine. Serialization support is the only external
//! concern allowed here.

/// Venue session credentials.
pub mod credential;

/// Session lifecycle state machine and transport events.
pub mod session;

/// Instrument tokens and subscription sets.
pub mod subscription;

/// Tick types and the latest-tick cache.
pub mod tick;
