//! WebSocket Ticker Transport
//!
//! One [`WsTickerTransport`] owns one connection run: connect with retries,
//! pump frames until the socket ends, report a final `Disconnected`. The
//! session manager creates a fresh transport for every (re)connect.
//!
//! # Connection Lifecycle
//!
//! 1. `connect()` spawns the run task
//! 2. Connect attempts follow [`ConnectRetry`]; an HTTP 400/401/403 on the
//!    upgrade is reported as an authentication error and ends the run
//! 3. On success: `Connected`, then tick batches and venue errors
//! 4. When the socket ends: `Disconnected { manual }`, where `manual` is true
//!    only if `close()` ended it
//! 5. If the retry budget runs out: `NoReconnect`

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::codec::TickerCodec;
use super::messages::{ControlMessage, InboundMessage};
use super::retry::{ConnectRetry, ConnectRetryConfig};
use crate::application::ports::{EventSink, TickMode, TickerTransport, TransportFactory};
use crate::domain::credential::Credential;
use crate::domain::session::{TransportError, TransportEvent};
use crate::domain::subscription::InstrumentToken;
use crate::infrastructure::config::{ApiKey, TickerSettings};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CONTROL_QUEUE_CAPACITY: usize = 64;

// =============================================================================
// Configuration
// =============================================================================

/// Transport configuration shared by every connection run.
#[derive(Debug, Clone)]
pub struct WsTransportConfig {
    /// Base WebSocket URL; credentials are appended as query parameters.
    pub url: String,
    /// Venue API key.
    pub api_key: ApiKey,
    /// Connect retry schedule.
    pub retry: ConnectRetryConfig,
    /// Interval between client pings.
    pub heartbeat_interval: Duration,
    /// Silence after which the connection is treated as dead.
    pub idle_timeout: Duration,
}

impl WsTransportConfig {
    /// Build from ticker settings.
    #[must_use]
    pub fn from_settings(api_key: ApiKey, settings: &TickerSettings) -> Self {
        Self {
            url: settings.ws_url.clone(),
            api_key,
            retry: ConnectRetryConfig::from_settings(settings),
            heartbeat_interval: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Creates [`WsTickerTransport`]s bound to a credential.
#[derive(Debug, Clone)]
pub struct WsTransportFactory {
    config: WsTransportConfig,
}

impl WsTransportFactory {
    /// Create a factory.
    #[must_use]
    pub const fn new(config: WsTransportConfig) -> Self {
        Self { config }
    }
}

impl TransportFactory for WsTransportFactory {
    fn create(
        &self,
        credential: &Credential,
        events: EventSink,
    ) -> Result<Box<dyn TickerTransport>, TransportError> {
        let access_token = credential
            .access_token()
            .ok_or_else(|| TransportError::authentication("credential has no access token"))?;
        let url = session_url(&self.config.url, self.config.api_key.as_str(), access_token)?;
        Ok(Box::new(WsTickerTransport::new(url, &self.config, events)))
    }
}

/// Append the API key and access token to the base URL.
fn session_url(base: &str, api_key: &str, access_token: &str) -> Result<String, TransportError> {
    let url = reqwest::Url::parse_with_params(
        base,
        &[("api_key", api_key), ("access_token", access_token)],
    )
    .map_err(|e| TransportError::connection(format!("invalid ticker URL: {e}")))?;

    match url.scheme() {
        "ws" | "wss" => Ok(url.into()),
        other => Err(TransportError::connection(format!(
            "unsupported ticker URL scheme: {other}"
        ))),
    }
}

// =============================================================================
// Transport
// =============================================================================

/// WebSocket transport for a single connection run.
pub struct WsTickerTransport {
    url: String,
    retry: ConnectRetryConfig,
    heartbeat_interval: Duration,
    idle_timeout: Duration,
    events: EventSink,
    control_tx: mpsc::Sender<ControlMessage>,
    control_rx: Mutex<Option<mpsc::Receiver<ControlMessage>>>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for WsTickerTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTickerTransport")
            .field("generation", &self.events.generation())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl WsTickerTransport {
    fn new(url: String, config: &WsTransportConfig, events: EventSink) -> Self {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
        Self {
            url,
            retry: config.retry.clone(),
            heartbeat_interval: config.heartbeat_interval,
            idle_timeout: config.idle_timeout,
            events,
            control_tx,
            control_rx: Mutex::new(Some(control_rx)),
            connected: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        }
    }

    fn send_control(&self, message: ControlMessage) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::not_connected(format!(
                "cannot send {} while disconnected",
                message.action
            )));
        }
        self.control_tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                TransportError::protocol("control queue is full")
            }
            mpsc::error::TrySendError::Closed(_) => {
                TransportError::not_connected("connection task has ended")
            }
        })
    }
}

impl TickerTransport for WsTickerTransport {
    fn connect(&self) -> Result<(), TransportError> {
        let control_rx = self
            .control_rx
            .lock()
            .take()
            .ok_or_else(|| TransportError::protocol("connect already called on this transport"))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::connection(format!("no async runtime: {e}")))?;

        let run = ConnectionRun {
            url: self.url.clone(),
            retry: ConnectRetry::new(self.retry.clone()),
            heartbeat_interval: self.heartbeat_interval,
            idle_timeout: self.idle_timeout,
            events: self.events.clone(),
            control_rx,
            connected: Arc::clone(&self.connected),
            cancel: self.cancel.clone(),
            codec: TickerCodec::new(),
        };
        runtime.spawn(run.run());
        Ok(())
    }

    fn subscribe(&self, tokens: &[InstrumentToken]) -> Result<(), TransportError> {
        self.send_control(ControlMessage::subscribe(tokens))
    }

    fn set_mode(&self, mode: TickMode, tokens: &[InstrumentToken]) -> Result<(), TransportError> {
        self.send_control(ControlMessage::mode(mode, tokens))
    }

    fn unsubscribe(&self, tokens: &[InstrumentToken]) -> Result<(), TransportError> {
        self.send_control(ControlMessage::unsubscribe(tokens))
    }

    fn close(&self) {
        self.cancel.cancel();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl Drop for WsTickerTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Connection Run
// =============================================================================

/// State owned by the background task of one transport.
struct ConnectionRun {
    url: String,
    retry: ConnectRetry,
    heartbeat_interval: Duration,
    idle_timeout: Duration,
    events: EventSink,
    control_rx: mpsc::Receiver<ControlMessage>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    codec: TickerCodec,
}

impl ConnectionRun {
    async fn run(mut self) {
        let generation = self.events.generation();
        let Some(stream) = self.connect_with_retry().await else {
            return;
        };

        self.connected.store(true, Ordering::Release);
        tracing::info!(generation, "Ticker WebSocket connected");
        self.events.emit(TransportEvent::Connected).await;

        let manual = self.pump(stream).await;

        self.connected.store(false, Ordering::Release);
        tracing::info!(generation, manual, "Ticker WebSocket closed");
        self.events.emit(TransportEvent::Disconnected { manual }).await;
    }

    /// Returns `None` when the run should end without a connection; any
    /// event explaining why has already been emitted.
    async fn connect_with_retry(&mut self) -> Option<WsStream> {
        loop {
            let attempt = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return None,
                result = tokio_tungstenite::connect_async(self.url.as_str()) => result,
            };

            let error = match attempt {
                Ok((stream, _response)) => {
                    self.retry.reset();
                    return Some(stream);
                }
                Err(e) => classify_connect_error(&e),
            };

            if error.is_authentication() {
                tracing::warn!(error = %error, "Ticker handshake rejected");
                self.events.emit(TransportEvent::Error(error)).await;
                return None;
            }

            let Some(delay) = self.retry.next_delay() else {
                tracing::error!(
                    attempts = self.retry.attempts(),
                    error = %error,
                    "Ticker connect retries exhausted"
                );
                self.events.emit(TransportEvent::NoReconnect).await;
                return None;
            };

            tracing::warn!(
                attempt = self.retry.attempts(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Ticker connect failed, retrying"
            );

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return None,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Pump frames until the socket ends. Returns true when `close()` ended it.
    async fn pump(&mut self, stream: WsStream) -> bool {
        let (mut write, mut read) = stream.split();

        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_frame = Instant::now();

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        tracing::debug!(error = %e, "Close frame not delivered");
                    }
                    return true;
                }

                Some(control) = self.control_rx.recv() => {
                    match self.codec.encode(&control) {
                        Ok(text) => {
                            if let Err(e) = write.send(Message::Text(text.into())).await {
                                tracing::warn!(error = %e, "Failed to send control frame");
                                return false;
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "Failed to encode control frame"),
                    }
                }

                frame = read.next() => {
                    last_frame = Instant::now();
                    match frame {
                        Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()).await,
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                tracing::warn!(error = %e, "Failed to answer ping");
                                return false;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Ticker closed by venue");
                            return false;
                        }
                        // Binary heartbeats and pongs only refresh liveness.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "Ticker read failed");
                            return false;
                        }
                        None => return false,
                    }
                }

                _ = heartbeat.tick() => {
                    if last_frame.elapsed() >= self.idle_timeout {
                        tracing::warn!(
                            idle_secs = last_frame.elapsed().as_secs(),
                            "Ticker connection idle, dropping"
                        );
                        return false;
                    }
                    if let Err(e) = write.send(Message::Ping(Vec::new().into())).await {
                        tracing::warn!(error = %e, "Failed to send ping");
                        return false;
                    }
                }
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        match self.codec.decode(text) {
            Ok(InboundMessage::Ticks(items)) => {
                if !items.is_empty() {
                    self.events.emit(TransportEvent::TickBatch(items)).await;
                }
            }
            Ok(InboundMessage::Error(message)) => {
                let error = TransportError::from_venue_message(message);
                self.events.emit(TransportEvent::Error(error)).await;
            }
            Ok(InboundMessage::Ignored(kind)) => {
                tracing::trace!(kind = %kind, "Ignoring ticker frame");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable ticker frame");
                self.events
                    .emit(TransportEvent::Error(TransportError::protocol(e.to_string())))
                    .await;
            }
        }
    }
}

/// Map a connect failure onto the transport error taxonomy.
fn classify_connect_error(error: &WsError) -> TransportError {
    match error {
        WsError::Http(response) => classify_handshake_status(response.status()),
        other => TransportError::connection(other.to_string()),
    }
}

fn classify_handshake_status(status: StatusCode) -> TransportError {
    if matches!(status.as_u16(), 400 | 401 | 403) {
        TransportError::authentication(format!("ticker handshake rejected with HTTP {status}"))
    } else {
        TransportError::connection(format!("ticker handshake failed with HTTP {status}"))
    }
}

// =============================================================================
// Tests
// =============================================================================
