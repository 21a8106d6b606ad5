//! In-Memory Store
//!
//! Process-local implementation of the store ports. Nothing survives a
//! restart.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{
    CredentialRepository, StoreError, SubscribedInstrument, SubscriptionRepository,
};
use crate::domain::credential::Credential;
use crate::domain::subscription::InstrumentToken;

/// In-memory subscription, credential and instrument store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    subscriptions: RwLock<BTreeSet<InstrumentToken>>,
    credentials: RwLock<Vec<Credential>>,
    instruments: RwLock<HashMap<InstrumentToken, SubscribedInstrument>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update an instrument reference entry.
    pub fn upsert_instrument(&self, instrument: SubscribedInstrument) {
        self.instruments
            .write()
            .insert(instrument.instrument_token, instrument);
    }

    /// Number of stored credential rows.
    #[must_use]
    pub fn credential_count(&self) -> usize {
        self.credentials.read().len()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryStore {
    async fn add(&self, token: InstrumentToken) -> Result<bool, StoreError> {
        Ok(self.subscriptions.write().insert(token))
    }

    async fn remove(&self, token: InstrumentToken) -> Result<bool, StoreError> {
        Ok(self.subscriptions.write().remove(&token))
    }

    async fn list(&self) -> Result<Vec<InstrumentToken>, StoreError> {
        Ok(self.subscriptions.read().iter().copied().collect())
    }

    async fn list_with_instruments(&self) -> Result<Vec<SubscribedInstrument>, StoreError> {
        let instruments = self.instruments.read();
        Ok(self
            .subscriptions
            .read()
            .iter()
            .map(|token| {
                instruments
                    .get(token)
                    .cloned()
                    .unwrap_or_else(|| SubscribedInstrument::bare(*token))
            })
            .collect())
    }
}

#[async_trait]
impl CredentialRepository for InMemoryStore {
    async fn latest(&self) -> Result<Option<Credential>, StoreError> {
        // Later rows win timestamp ties, matching the SQL ordering.
        Ok(self
            .credentials
            .read()
            .iter()
            .enumerate()
            .max_by_key(|(index, credential)| (credential.updated_at(), *index))
            .map(|(_, credential)| credential.clone()))
    }

    async fn replace(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut credentials = self.credentials.write();
        credentials.clear();
        credentials.push(credential.clone());
        drop(credentials);
        Ok(())
    }

    async fn append(&self, credential: &Credential) -> Result<(), StoreError> {
        self.credentials.write().push(credential.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn credential(access: &str, secs: i64) -> Credential {
        Credential::with_timestamp(
            Some(access.to_string()),
            None,
            Utc.timestamp_opt(1_767_000_000 + secs, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn subscriptions_have_set_semantics() {
        let store = InMemoryStore::new();
        assert!(store.add(3).await.unwrap());
        assert!(!store.add(3).await.unwrap());
        store.add(1).await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec![1, 3]);
        assert!(store.remove(3).await.unwrap());
        assert_eq!(store.list().await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn listing_fills_missing_reference_data_with_none() {
        let store = InMemoryStore::new();
        store.upsert_instrument(SubscribedInstrument {
            instrument_token: 2,
            tradingsymbol: Some("INFY".to_string()),
            name: None,
            exchange: Some("NSE".to_string()),
        });
        store.add(1).await.unwrap();
        store.add(2).await.unwrap();

        let rows = store.list_with_instruments().await.unwrap();
        assert_eq!(rows[0], SubscribedInstrument::bare(1));
        assert_eq!(rows[1].tradingsymbol.as_deref(), Some("INFY"));
    }

    #[tokio::test]
    async fn latest_follows_timestamp_then_insert_order() {
        let store = InMemoryStore::new();
        store.append(&credential("b", 5)).await.unwrap();
        store.append(&credential("a", 1)).await.unwrap();
        store.append(&credential("c", 5)).await.unwrap();
        assert_eq!(
            store.latest().await.unwrap().unwrap().access_token(),
            Some("c")
        );
    }

    #[tokio::test]
    async fn replace_keeps_a_single_row() {
        let store = InMemoryStore::new();
        store.append(&credential("a", 0)).await.unwrap();
        store.append(&credential("b", 1)).await.unwrap();
        store.replace(&credential("z", 0)).await.unwrap();
        assert_eq!(store.credential_count(), 1);
    }
}
