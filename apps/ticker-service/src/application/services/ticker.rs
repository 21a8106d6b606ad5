//! Ticker Service
//!
//! Use cases behind the HTTP API: subscription changes, cache reads, token
//! rotation and operator stop. Each mutating call validates, persists, then
//! asks the session manager to reconcile.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::application::error::{ServiceError, SessionError};
use crate::application::ports::{CredentialRepository, SubscriptionRepository};
use crate::application::services::session::{SessionHandle, SessionSnapshot};
use crate::domain::credential::Credential;
use crate::domain::session::SessionState;
use crate::domain::subscription::{InstrumentToken, dedup_tokens};
use crate::domain::tick::{Depth, DepthLookupError, Tick, TickCache};
use crate::infrastructure::metrics;

// =============================================================================
// Views
// =============================================================================

/// Result of a subscribe call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Nothing was requested; the session was only ensured.
    NothingRequested,
    /// Tokens were persisted; carries the full persisted set.
    Subscribed(Vec<InstrumentToken>),
}

/// One row of the subscription listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionView {
    /// Subscribed token.
    pub instrument_token: InstrumentToken,
    /// Exchange trading symbol.
    pub tradingsymbol: Option<String>,
    /// Instrument name.
    pub name: Option<String>,
    /// Exchange code.
    pub exchange: Option<String>,
    /// Last traded price.
    pub ltp: Option<Decimal>,
    /// Time of the last trade.
    pub tick_time: Option<DateTime<Utc>>,
    /// Best bid price.
    pub bid_price: Option<Decimal>,
    /// Quantity at the best bid.
    pub bid_quantity: Option<u64>,
    /// Volume at the best bid.
    pub bid_volume: Option<u64>,
    /// Orders at the best bid.
    pub bid_orders: Option<u32>,
    /// Best ask price.
    pub ask_price: Option<Decimal>,
    /// Quantity at the best ask.
    pub ask_quantity: Option<u64>,
    /// Volume at the best ask.
    pub ask_volume: Option<u64>,
    /// Orders at the best ask.
    pub ask_orders: Option<u32>,
}

/// Session and subscription summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    /// Session snapshot.
    pub session: SessionSnapshot,
    /// Persisted subscription set.
    pub subscriptions: Vec<InstrumentToken>,
}

impl StatusView {
    /// Whether the ticker is connected.
    #[must_use]
    pub const fn connected(&self) -> bool {
        self.session.connected
    }
}

// =============================================================================
// Service
// =============================================================================

/// Subscription API use cases.
pub struct TickerService {
    session: SessionHandle,
    subscriptions: Arc<dyn SubscriptionRepository>,
    credentials: Arc<dyn CredentialRepository>,
    cache: Arc<TickCache>,
}

impl TickerService {
    /// Create the service.
    #[must_use]
    pub fn new(
        session: SessionHandle,
        subscriptions: Arc<dyn SubscriptionRepository>,
        credentials: Arc<dyn CredentialRepository>,
        cache: Arc<TickCache>,
    ) -> Self {
        Self {
            session,
            subscriptions,
            credentials,
            cache,
        }
    }

    /// Session handle, for callers that drive the session directly.
    #[must_use]
    pub const fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Shared tick cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<TickCache> {
        &self.cache
    }

    /// Load the stored credential and resume streaming if there is one.
    ///
    /// Returns whether a session was started.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential cannot be loaded or the session
    /// manager is gone. A failed start is logged, not returned.
    pub async fn restore(&self) -> Result<bool, ServiceError> {
        let Some(credential) = self.credentials.latest().await? else {
            tracing::info!("No stored ticker credential, waiting for login");
            return Ok(false);
        };

        let usable = credential.is_usable();
        self.session.update_credential(credential).await?;
        if !usable {
            tracing::warn!("Stored ticker credential has no access token");
            return Ok(false);
        }

        match self.session.ensure_started().await {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to resume ticker at startup");
                Ok(false)
            }
        }
    }

    /// Persist tokens and restart the session so they are replayed.
    ///
    /// An empty request only makes sure a session exists; without a
    /// credential it succeeds and starts nothing.
    ///
    /// # Errors
    ///
    /// `Authentication` without a credential for a non-empty request,
    /// `Store` if persisting fails.
    pub async fn subscribe(
        &self,
        tokens: &[InstrumentToken],
    ) -> Result<SubscribeOutcome, ServiceError> {
        if tokens.is_empty() {
            let snapshot = self.session.status().await?;
            if snapshot.state == SessionState::Idle {
                match self.session.ensure_started().await {
                    Err(SessionError::NoCredential) => {
                        tracing::warn!("Empty subscribe without a credential, ticker not started");
                    }
                    other => other?,
                }
            }
            return Ok(SubscribeOutcome::NothingRequested);
        }

        self.require_credential().await?;

        let tokens = dedup_tokens(tokens);
        let mut added = 0usize;
        for token in &tokens {
            if self.subscriptions.add(*token).await? {
                added += 1;
            }
        }
        tracing::info!(requested = tokens.len(), added, "Subscriptions persisted");

        if let Err(e) = self.session.ensure_started().await {
            tracing::warn!(error = %e, "Subscriptions saved but ticker restart failed");
        }

        let subscribed = self.subscriptions.list().await?;
        metrics::set_subscriptions(subscribed.len());
        Ok(SubscribeOutcome::Subscribed(subscribed))
    }

    /// Remove tokens from the store and the live transport.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty list, `Authentication` without a
    /// credential, `Store` if removing fails.
    pub async fn unsubscribe(
        &self,
        tokens: &[InstrumentToken],
    ) -> Result<Vec<InstrumentToken>, ServiceError> {
        if tokens.is_empty() {
            return Err(ServiceError::Validation(
                "tokens must be a non-empty array".to_string(),
            ));
        }

        self.require_credential().await?;

        let tokens = dedup_tokens(tokens);
        for token in &tokens {
            self.subscriptions.remove(*token).await?;
        }

        let sent = self.session.unsubscribe(tokens.clone()).await?;
        tracing::info!(count = tokens.len(), live = sent, "Unsubscribed");

        let subscribed = self.subscriptions.list().await?;
        metrics::set_subscriptions(subscribed.len());
        Ok(subscribed)
    }

    /// Latest cached tick.
    ///
    /// # Errors
    ///
    /// `NotFound` if no tick has arrived for the token.
    pub fn latest_tick(&self, token: InstrumentToken) -> Result<Tick, ServiceError> {
        self.cache.get(token).ok_or_else(|| {
            tracing::debug!(instrument_token = token, "Tick cache miss");
            ServiceError::NotFound(format!("No tick data for instrument {token}"))
        })
    }

    /// Depth of the latest cached tick.
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no tick, or the tick has no depth.
    pub fn depth(&self, token: InstrumentToken) -> Result<Depth, ServiceError> {
        self.cache.depth(token).map_err(|e| {
            tracing::debug!(instrument_token = token, reason = %e, "Depth cache miss");
            match e {
                DepthLookupError::NoTick(_) => {
                    ServiceError::NotFound(format!("No tick data for instrument {token}"))
                }
                DepthLookupError::NoDepth(_) => {
                    ServiceError::NotFound(format!("No depth data for instrument {token}"))
                }
            }
        })
    }

    /// Persisted subscriptions enriched with reference data and cached
    /// prices. Missing data yields empty fields.
    ///
    /// # Errors
    ///
    /// `Store` if the listing query fails.
    pub async fn list_subscriptions(&self) -> Result<Vec<SubscriptionView>, ServiceError> {
        let rows = self.subscriptions.list_with_instruments().await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let tick = self.cache.get(row.instrument_token);
                let depth = tick.as_ref().and_then(|t| t.depth.as_ref());
                let bid = depth.and_then(Depth::best_bid);
                let ask = depth.and_then(Depth::best_ask);

                SubscriptionView {
                    instrument_token: row.instrument_token,
                    tradingsymbol: row.tradingsymbol,
                    name: row.name,
                    exchange: row.exchange,
                    ltp: tick.as_ref().map(|t| t.last_price),
                    tick_time: tick.as_ref().and_then(|t| t.last_trade_time),
                    bid_price: bid.map(|l| l.price),
                    bid_quantity: bid.map(|l| l.quantity),
                    bid_volume: bid.and_then(|l| l.volume),
                    bid_orders: bid.and_then(|l| l.orders),
                    ask_price: ask.map(|l| l.price),
                    ask_quantity: ask.map(|l| l.quantity),
                    ask_volume: ask.and_then(|l| l.volume),
                    ask_orders: ask.and_then(|l| l.orders),
                }
            })
            .collect())
    }

    /// Session state plus the persisted set.
    ///
    /// # Errors
    ///
    /// `Store` if the listing fails, `Unavailable` if the session manager is
    /// gone.
    pub async fn status(&self) -> Result<StatusView, ServiceError> {
        let session = self.session.status().await?;
        let subscriptions = self.subscriptions.list().await?;
        Ok(StatusView {
            session,
            subscriptions,
        })
    }

    /// Replace every stored credential, then restart the session.
    ///
    /// # Errors
    ///
    /// `Validation` without an access token, `Store` if persisting fails,
    /// `Transport`/`Authentication` if the restart fails.
    pub async fn set_access_token(
        &self,
        access_token: Option<String>,
        public_token: Option<String>,
    ) -> Result<(), ServiceError> {
        let credential = Self::credential_from(access_token, public_token)?;
        self.credentials.replace(&credential).await?;
        tracing::info!("Ticker credentials replaced");
        self.rotate(credential).await
    }

    /// Append a credential to the history, then restart the session.
    ///
    /// # Errors
    ///
    /// Same as [`Self::set_access_token`].
    pub async fn provide_access_token(
        &self,
        access_token: Option<String>,
        public_token: Option<String>,
    ) -> Result<(), ServiceError> {
        let credential = Self::credential_from(access_token, public_token)?;
        self.credentials.append(&credential).await?;
        tracing::info!("Ticker credential appended");
        self.rotate(credential).await
    }

    /// Operator stop.
    ///
    /// # Errors
    ///
    /// `Unavailable` if the session manager is gone.
    pub async fn disconnect(&self) -> Result<(), ServiceError> {
        self.session.stop(true).await?;
        Ok(())
    }

    fn credential_from(
        access_token: Option<String>,
        public_token: Option<String>,
    ) -> Result<Credential, ServiceError> {
        let credential = Credential::new(access_token, public_token);
        if credential.is_usable() {
            Ok(credential)
        } else {
            Err(ServiceError::Validation("access_token is required".to_string()))
        }
    }

    async fn rotate(&self, credential: Credential) -> Result<(), ServiceError> {
        self.session.update_credential(credential).await?;
        self.session.ensure_started().await?;
        Ok(())
    }

    async fn require_credential(&self) -> Result<(), ServiceError> {
        if self.session.status().await?.has_credential {
            Ok(())
        } else {
            Err(ServiceError::Authentication(
                "Access token not set. Please login first.".to_string(),
            ))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
