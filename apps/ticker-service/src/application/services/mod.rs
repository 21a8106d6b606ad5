//! Application Services
//!
//! - `session`: the actor that owns the ticker transport
//! - `ticker`: the subscription API used by the HTTP layer

/// Streaming session manager actor.
pub mod session;

/// Subscription, tick and credential use cases.
pub mod ticker;

pub use session::{SessionConfig, SessionHandle, SessionManager, SessionSnapshot};
pub use ticker::{StatusView, SubscribeOutcome, SubscriptionView, TickerService};
