//! Scripted transport for tests.
//!
//! Records every call made on the transports it creates and lets the test
//! emit transport events on their behalf.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::application::ports::{EventSink, TickMode, TickerTransport, TransportFactory};
use crate::domain::credential::Credential;
use crate::domain::session::{TransportError, TransportEvent};
use crate::domain::subscription::InstrumentToken;

/// A call observed on a mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// `connect()`.
    Connect,
    /// `subscribe(tokens)`.
    Subscribe(Vec<InstrumentToken>),
    /// `set_mode(mode, tokens)`.
    SetMode(TickMode, Vec<InstrumentToken>),
    /// `unsubscribe(tokens)`.
    Unsubscribe(Vec<InstrumentToken>),
    /// `close()`.
    Close,
}

#[derive(Debug)]
struct MockTransportState {
    sink: EventSink,
    access_token: Option<String>,
    calls: Mutex<Vec<TransportCall>>,
    connected: AtomicBool,
    fail_connect: Option<TransportError>,
}

/// Test-side view of one created transport.
#[derive(Debug, Clone)]
pub struct MockTransportHandle {
    state: Arc<MockTransportState>,
}

impl MockTransportHandle {
    /// Generation the session manager assigned.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.sink.generation()
    }

    /// Access token the transport was created with.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.state.access_token.clone()
    }

    /// Calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.calls.lock().clone()
    }

    /// Whether `close()` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.calls.lock().contains(&TransportCall::Close)
    }

    /// Emit an event as this transport. `Connected` and `Disconnected`
    /// also flip the connection flag.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Connected => self.state.connected.store(true, Ordering::Release),
            TransportEvent::Disconnected { .. } => {
                self.state.connected.store(false, Ordering::Release);
            }
            _ => {}
        }
        self.state.sink.emit(event).await
    }
}

struct MockTransport {
    state: Arc<MockTransportState>,
}

impl MockTransport {
    fn record(&self, call: TransportCall) {
        self.state.calls.lock().push(call);
    }

    fn control(&self, call: TransportCall) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::not_connected("mock transport is not connected"));
        }
        self.record(call);
        Ok(())
    }
}

impl TickerTransport for MockTransport {
    fn connect(&self) -> Result<(), TransportError> {
        self.record(TransportCall::Connect);
        self.state.fail_connect.clone().map_or(Ok(()), Err)
    }

    fn subscribe(&self, tokens: &[InstrumentToken]) -> Result<(), TransportError> {
        self.control(TransportCall::Subscribe(tokens.to_vec()))
    }

    fn set_mode(&self, mode: TickMode, tokens: &[InstrumentToken]) -> Result<(), TransportError> {
        self.control(TransportCall::SetMode(mode, tokens.to_vec()))
    }

    fn unsubscribe(&self, tokens: &[InstrumentToken]) -> Result<(), TransportError> {
        self.control(TransportCall::Unsubscribe(tokens.to_vec()))
    }

    fn close(&self) {
        self.state.connected.store(false, Ordering::Release);
        self.record(TransportCall::Close);
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }
}

/// Factory producing recorded mock transports.
#[derive(Debug, Default)]
pub struct MockTransportFactory {
    created: Mutex<Vec<MockTransportHandle>>,
    fail_create: Mutex<Option<TransportError>>,
    fail_connect: Mutex<Option<TransportError>>,
}

impl MockTransportFactory {
    /// Create a factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `create` calls fail.
    pub fn set_fail_create(&self, error: Option<TransportError>) {
        *self.fail_create.lock() = error;
    }

    /// Make `connect` fail on transports created from now on.
    pub fn set_fail_connect(&self, error: Option<TransportError>) {
        *self.fail_connect.lock() = error;
    }

    /// Number of transports created.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    /// The most recently created transport.
    #[must_use]
    pub fn latest(&self) -> Option<MockTransportHandle> {
        self.created.lock().last().cloned()
    }

    /// Transport by creation order.
    #[must_use]
    pub fn transport(&self, index: usize) -> Option<MockTransportHandle> {
        self.created.lock().get(index).cloned()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(
        &self,
        credential: &Credential,
        events: EventSink,
    ) -> Result<Box<dyn TickerTransport>, TransportError> {
        if let Some(error) = self.fail_create.lock().clone() {
            return Err(error);
        }
        let state = Arc::new(MockTransportState {
            sink: events,
            access_token: credential.access_token().map(str::to_string),
            calls: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            fail_connect: self.fail_connect.lock().clone(),
        });
        self.created.lock().push(MockTransportHandle {
            state: Arc::clone(&state),
        });
        Ok(Box::new(MockTransport { state }))
    }
}
