//! Ticker Transport Port (Driven Port)
//!
//! Contract for the venue's streaming connection. A transport never calls
//! back into the session manager; it reports everything as
//! [`TransportEvent`]s through the [`EventSink`] it was created with.

use tokio::sync::mpsc;

use crate::domain::credential::Credential;
use crate::domain::session::{TransportError, TransportEvent};
use crate::domain::subscription::InstrumentToken;

/// Streaming detail level requested for a set of instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickMode {
    /// Last traded price only.
    Ltp,
    /// Price, volume and OHLC, no depth.
    Quote,
    /// Everything, including market depth.
    Full,
}

impl TickMode {
    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ltp => "ltp",
            Self::Quote => "quote",
            Self::Full => "full",
        }
    }
}

/// A transport event stamped with the generation of the transport that
/// emitted it.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    /// Generation of the emitting transport.
    pub generation: u64,
    /// The event.
    pub event: TransportEvent,
}

/// Sending half handed to a transport at creation time.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::Sender<TaggedEvent>,
}

impl EventSink {
    /// Bind a sender to a transport generation.
    #[must_use]
    pub const fn new(generation: u64, tx: mpsc::Sender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    /// Generation this sink stamps onto events.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver an event, waiting for channel capacity.
    ///
    /// Returns false once the session manager has gone away.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .await
            .is_ok()
    }
}

/// Port for a single streaming connection.
///
/// Calls are synchronous and must not block: `connect` starts the work in
/// the background and control calls only enqueue frames.
pub trait TickerTransport: Send + Sync {
    /// Start connecting. The outcome arrives as events.
    ///
    /// # Errors
    ///
    /// Returns an error if the connect cannot even be started.
    fn connect(&self) -> Result<(), TransportError>;

    /// Subscribe to instruments.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is not connected.
    fn subscribe(&self, tokens: &[InstrumentToken]) -> Result<(), TransportError>;

    /// Set the streaming mode for instruments.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is not connected.
    fn set_mode(&self, mode: TickMode, tokens: &[InstrumentToken]) -> Result<(), TransportError>;

    /// Unsubscribe from instruments.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is not connected.
    fn unsubscribe(&self, tokens: &[InstrumentToken]) -> Result<(), TransportError>;

    /// Close the connection. Idempotent.
    fn close(&self);

    /// Whether the connection is currently open.
    fn is_connected(&self) -> bool;
}

/// Port for creating transports bound to a credential.
pub trait TransportFactory: Send + Sync {
    /// Create a transport that reports through `events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential or endpoint cannot be used.
    fn create(
        &self,
        credential: &Credential,
        events: EventSink,
    ) -> Result<Box<dyn TickerTransport>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sink_stamps_generation() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = EventSink::new(7, tx);

        assert!(sink.emit(TransportEvent::Connected).await);
        let tagged = rx.recv().await.unwrap();
        assert_eq!(tagged.generation, 7);
        assert_eq!(tagged.event, TransportEvent::Connected);
    }

    #[tokio::test]
    async fn sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sink = EventSink::new(1, tx);
        assert!(!sink.emit(TransportEvent::NoReconnect).await);
    }
}
