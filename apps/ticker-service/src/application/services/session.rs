//! Streaming Session Manager
//!
//! A single tokio task owns the ticker transport, the credential, the
//! manual-stop flag and the reconnect deadline. Everything else talks to it
//! through a cloneable [`SessionHandle`].
//!
//! # Event loop
//!
//! The actor selects over, in priority order:
//! - the shutdown token
//! - tagged transport events (stale generations are dropped)
//! - the reconnect deadline, when armed
//! - operator commands, each answered on a oneshot
//!
//! Transport events are drained before commands so a status query issued
//! after an event observes its effect.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::error::SessionError;
use crate::application::ports::{
    EventSink, Notifier, SubscriptionRepository, TaggedEvent, TickMode, TickerTransport,
    TransportFactory,
};
use crate::domain::credential::Credential;
use crate::domain::session::{
    SessionAction, SessionMachine, SessionState, TeardownReason, TransportEvent,
};
use crate::domain::subscription::{InstrumentToken, SubscriptionSet};
use crate::domain::tick::TickCache;
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Session manager configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fixed delay before reconnecting after an unexpected disconnect.
    pub reconnect_delay: Duration,
    /// Capacity of the transport event channel.
    pub event_capacity: usize,
    /// Capacity of the operator command channel.
    pub command_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            event_capacity: 1024,
            command_capacity: 64,
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Lifecycle state.
    pub state: SessionState,
    /// Whether the transport reports an open connection.
    pub connected: bool,
    /// Whether a usable credential is known.
    pub has_credential: bool,
    /// Whether the operator stopped the session.
    pub manual_stop: bool,
    /// Whether a reconnect is scheduled.
    pub reconnect_pending: bool,
    /// Generation of the current transport (0 before the first start).
    pub generation: u64,
    /// Tokens the live transport has been subscribed to.
    pub live_subscriptions: Vec<InstrumentToken>,
}

enum Command {
    EnsureStarted {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Stop {
        manual: bool,
        reply: oneshot::Sender<()>,
    },
    UpdateCredential {
        credential: Credential,
        reply: oneshot::Sender<()>,
    },
    Unsubscribe {
        tokens: Vec<InstrumentToken>,
        reply: oneshot::Sender<bool>,
    },
    Status {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Cloneable handle to the session manager task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::EnsureStarted { .. } => "EnsureStarted",
            Self::Stop { .. } => "Stop",
            Self::UpdateCredential { .. } => "UpdateCredential",
            Self::Unsubscribe { .. } => "Unsubscribe",
            Self::Status { .. } => "Status",
        };
        f.write_str(name)
    }
}

impl SessionHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| SessionError::Unavailable)?;
        rx.await.map_err(|_| SessionError::Unavailable)
    }

    /// Tear down any existing transport and start a fresh one bound to the
    /// current credential. Returns once connect has been issued, not once
    /// it has succeeded.
    ///
    /// # Errors
    ///
    /// Returns `NoCredential` if no usable credential is known, or
    /// `TransportInit` if the transport cannot be created or started.
    pub async fn ensure_started(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::EnsureStarted { reply })
            .await?
    }

    /// Stop the session. A manual stop also suppresses automatic reconnects
    /// until the next `ensure_started`.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the manager task has exited.
    pub async fn stop(&self, manual: bool) -> Result<(), SessionError> {
        self.request(|reply| Command::Stop { manual, reply }).await
    }

    /// Replace the in-memory credential. Does not restart the session.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the manager task has exited.
    pub async fn update_credential(&self, credential: Credential) -> Result<(), SessionError> {
        self.request(|reply| Command::UpdateCredential { credential, reply })
            .await
    }

    /// Unsubscribe tokens on the live transport, if connected.
    ///
    /// Returns whether an unsubscribe was sent.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the manager task has exited.
    pub async fn unsubscribe(&self, tokens: Vec<InstrumentToken>) -> Result<bool, SessionError> {
        self.request(|reply| Command::Unsubscribe { tokens, reply })
            .await
    }

    /// Current session snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the manager task has exited.
    pub async fn status(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| Command::Status { reply }).await
    }
}

// =============================================================================
// Actor
// =============================================================================

/// Owner of the ticker transport.
pub struct SessionManager {
    config: SessionConfig,
    factory: Arc<dyn TransportFactory>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    cache: Arc<TickCache>,
    notifier: Arc<dyn Notifier>,
    event_tx: mpsc::Sender<TaggedEvent>,
    machine: SessionMachine,
    credential: Option<Credential>,
    transport: Option<Box<dyn TickerTransport>>,
    generation: u64,
    live: SubscriptionSet,
    reconnect_at: Option<Instant>,
}

impl SessionManager {
    /// Spawn the manager task.
    ///
    /// The task exits when `shutdown` is cancelled or every handle is
    /// dropped, closing any open transport on the way out.
    #[must_use]
    pub fn spawn(
        config: SessionConfig,
        factory: Arc<dyn TransportFactory>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        cache: Arc<TickCache>,
        notifier: Arc<dyn Notifier>,
        shutdown: CancellationToken,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));

        let manager = Self {
            config,
            factory,
            subscriptions,
            cache,
            notifier,
            event_tx,
            machine: SessionMachine::new(),
            credential: None,
            transport: None,
            generation: 0,
            live: SubscriptionSet::new(),
            reconnect_at: None,
        };

        let task = tokio::spawn(manager.run(command_rx, event_rx, shutdown));
        (SessionHandle { tx: command_tx }, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::Receiver<TaggedEvent>,
        shutdown: CancellationToken,
    ) {
        tracing::debug!("Session manager started");

        loop {
            let reconnect_at = self.reconnect_at;

            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    self.stop(true);
                    break;
                }

                Some(tagged) = events.recv() => {
                    self.handle_event(tagged).await;
                }

                () = wait_until(reconnect_at) => {
                    self.reconnect_at = None;
                    self.on_reconnect_due();
                }

                command = commands.recv() => {
                    let Some(command) = command else {
                        self.stop(true);
                        break;
                    };
                    self.handle_command(command);
                }
            }
        }

        tracing::debug!("Session manager stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::EnsureStarted { reply } => {
                let result = self.start_transport();
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "Failed to start ticker");
                }
                let _ = reply.send(result);
            }
            Command::Stop { manual, reply } => {
                self.stop(manual);
                let _ = reply.send(());
            }
            Command::UpdateCredential { credential, reply } => {
                tracing::info!(
                    has_access_token = credential.is_usable(),
                    "Ticker credential updated"
                );
                self.credential = Some(credential);
                let _ = reply.send(());
            }
            Command::Unsubscribe { tokens, reply } => {
                let _ = reply.send(self.unsubscribe_live(&tokens));
            }
            Command::Status { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn handle_event(&mut self, tagged: TaggedEvent) {
        if tagged.generation != self.generation || self.transport.is_none() {
            tracing::debug!(
                event_generation = tagged.generation,
                current_generation = self.generation,
                "Dropping event from stale transport"
            );
            return;
        }

        let event = match tagged.event {
            TransportEvent::TickBatch(items) => {
                let outcome = self.cache.apply_batch(items);
                metrics::record_ticks(outcome.applied, outcome.rejected);
                return;
            }
            event => event,
        };

        match self.machine.on_event(&event) {
            SessionAction::None => {
                tracing::debug!(state = self.machine.state().as_str(), ?event, "Ticker event");
                if matches!(event, TransportEvent::Disconnected { .. }) {
                    metrics::set_connected(false);
                }
            }
            SessionAction::ReplaySubscriptions => {
                tracing::info!(generation = self.generation, "Ticker connected");
                metrics::set_connected(true);
                self.replay_subscriptions().await;
            }
            SessionAction::ScheduleReconnect => {
                metrics::set_connected(false);
                self.schedule_reconnect();
            }
            SessionAction::LogError => {
                if let TransportEvent::Error(error) = &event {
                    tracing::warn!(kind = error.kind.as_str(), error = %error.message, "Ticker error");
                    metrics::record_transport_error(error.kind);
                }
            }
            SessionAction::Teardown(reason) => {
                if let TransportEvent::Error(error) = &event {
                    metrics::record_transport_error(error.kind);
                }
                self.reconnect_at = None;
                self.teardown();
                let message = match reason {
                    TeardownReason::AuthenticationFailed => {
                        tracing::error!("Ticker authentication failed, a fresh access token is required");
                        "Ticker authentication failed. Set a fresh access token to resume streaming."
                    }
                    TeardownReason::RetriesExhausted => {
                        tracing::error!("Ticker gave up reconnecting");
                        "Ticker gave up reconnecting. Live ticks are stopped until it is restarted."
                    }
                };
                self.notifier.notify(message);
            }
        }
    }

    fn start_transport(&mut self) -> Result<(), SessionError> {
        self.reconnect_at = None;
        self.teardown();

        let credential = self
            .credential
            .as_ref()
            .filter(|c| c.is_usable())
            .ok_or(SessionError::NoCredential)?;

        self.generation += 1;
        let sink = EventSink::new(self.generation, self.event_tx.clone());
        let transport = self
            .factory
            .create(credential, sink)
            .map_err(SessionError::TransportInit)?;
        transport.connect().map_err(SessionError::TransportInit)?;

        self.machine.begin_connect();
        self.transport = Some(transport);
        tracing::info!(generation = self.generation, "Ticker transport started");
        Ok(())
    }

    fn stop(&mut self, manual: bool) {
        self.machine.request_stop(manual);
        self.reconnect_at = None;
        if self.transport.is_some() {
            tracing::info!(manual, "Stopping ticker");
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.close();
            tracing::debug!(generation = self.generation, "Ticker transport closed");
        }
        self.live.clear();
        self.machine.torn_down();
        metrics::set_connected(false);
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.config.reconnect_delay;
        self.reconnect_at = Some(Instant::now() + delay);
        metrics::record_reconnect_scheduled();
        tracing::info!(delay_ms = delay.as_millis(), "Ticker disconnected, reconnect scheduled");
    }

    fn on_reconnect_due(&mut self) {
        if !self.machine.may_reconnect() {
            tracing::debug!("Reconnect skipped after manual stop");
            return;
        }

        tracing::info!("Reconnecting ticker");
        match self.start_transport() {
            Ok(()) => {}
            Err(SessionError::NoCredential) => {
                tracing::warn!("Reconnect abandoned, no credential available");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reconnect failed");
                self.schedule_reconnect();
            }
        }
    }

    async fn replay_subscriptions(&mut self) {
        let tokens = match self.subscriptions.list().await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load subscriptions for replay");
                return;
            }
        };

        if tokens.is_empty() {
            tracing::debug!("No subscriptions to replay");
            return;
        }

        let Some(transport) = self.transport.as_ref() else {
            return;
        };

        if let Err(e) = transport.subscribe(&tokens) {
            tracing::warn!(error = %e, "Failed to replay subscriptions");
            return;
        }
        if let Err(e) = transport.set_mode(TickMode::Full, &tokens) {
            tracing::warn!(error = %e, "Failed to set full mode");
        }

        tracing::info!(count = tokens.len(), "Replayed subscriptions");
        self.live = tokens.into_iter().collect();
    }

    fn unsubscribe_live(&mut self, tokens: &[InstrumentToken]) -> bool {
        if self.machine.state() != SessionState::Connected {
            return false;
        }
        let Some(transport) = self.transport.as_ref() else {
            return false;
        };

        match transport.unsubscribe(tokens) {
            Ok(()) => {
                let removed = self.live.remove_all(tokens);
                tracing::debug!(requested = tokens.len(), removed = removed.len(), "Live unsubscribe sent");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Live unsubscribe failed");
                false
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.machine.state(),
            connected: self.transport.as_ref().is_some_and(|t| t.is_connected()),
            has_credential: self.credential.as_ref().is_some_and(Credential::is_usable),
            manual_stop: self.machine.is_manually_stopped(),
            reconnect_pending: self.reconnect_at.is_some(),
            generation: self.generation,
            live_subscriptions: self.live.to_vec(),
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
