//! Application Ports (Driven)
//!
//! Interfaces the session manager and the subscription service use to reach
//! the outside world. Infrastructure adapters implement them; tests swap in
//! in-memory or recording fakes.
//!
//! - `TickerTransport` / `TransportFactory`: the venue's streaming connection
//! - `SubscriptionRepository` / `CredentialRepository`: the relational store
//! - `Notifier`: operator alerts

mod notifier_port;
mod store_port;
mod transport_port;

pub use notifier_port::{NoOpNotifier, Notifier};
pub use store_port::{CredentialRepository, StoreError, SubscribedInstrument, SubscriptionRepository};
pub use transport_port::{EventSink, TaggedEvent, TickMode, TickerTransport, TransportFactory};

#[cfg(test)]
pub use store_port::{MockCredentialRepository, MockSubscriptionRepository};
