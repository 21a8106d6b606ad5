//! Store Ports (Driven Ports)
//!
//! Durable subscription set and credential history.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::credential::Credential;
use crate::domain::subscription::InstrumentToken;

/// Durable store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Could not reach the database.
    #[error("store connection error: {0}")]
    Connection(String),

    /// A query failed.
    #[error("store query error: {0}")]
    Query(String),

    /// A stored row could not be mapped back to a domain value.
    #[error("store data error: {0}")]
    Data(String),
}

/// A subscribed token joined with instrument reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribedInstrument {
    /// Subscribed token.
    pub instrument_token: InstrumentToken,
    /// Exchange trading symbol.
    pub tradingsymbol: Option<String>,
    /// Instrument name.
    pub name: Option<String>,
    /// Exchange code.
    pub exchange: Option<String>,
}

impl SubscribedInstrument {
    /// Entry with no reference data.
    #[must_use]
    pub const fn bare(instrument_token: InstrumentToken) -> Self {
        Self {
            instrument_token,
            tradingsymbol: None,
            name: None,
            exchange: None,
        }
    }
}

/// Port for the durable subscription set.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Insert a token if absent. Returns true if it was newly added.
    async fn add(&self, token: InstrumentToken) -> Result<bool, StoreError>;

    /// Remove a token. Returns true if it was present.
    async fn remove(&self, token: InstrumentToken) -> Result<bool, StoreError>;

    /// All subscribed tokens in ascending order.
    async fn list(&self) -> Result<Vec<InstrumentToken>, StoreError>;

    /// All subscribed tokens with their reference data, ascending by token.
    async fn list_with_instruments(&self) -> Result<Vec<SubscribedInstrument>, StoreError>;
}

/// Port for the credential history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Most recently stored credential.
    async fn latest(&self) -> Result<Option<Credential>, StoreError>;

    /// Delete every stored credential and store this one.
    async fn replace(&self, credential: &Credential) -> Result<(), StoreError>;

    /// Store this credential alongside the existing history.
    async fn append(&self, credential: &Credential) -> Result<(), StoreError>;
}
