//! Application Layer - Use cases and port definitions.
//!
//! The session manager actor and the subscription service live here, along
//! with the ports they drive.

/// Application errors.
pub mod error;

/// Port interfaces for the transport, store and notifier.
pub mod ports;

/// Session manager and subscription service.
pub mod services;
