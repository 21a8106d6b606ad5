//! SQLite Store
//!
//! Durable subscription set, credential history and the instrument
//! reference table, reached through parameterized `sqlx` queries.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow,
};

use crate::application::ports::{
    CredentialRepository, StoreError, SubscribedInstrument, SubscriptionRepository,
};
use crate::domain::credential::Credential;
use crate::domain::subscription::InstrumentToken;

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS ticker_subscriptions (
        instrument_token INTEGER PRIMARY KEY,
        created_at TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS ticker_credentials (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        access_token TEXT,
        public_token TEXT,
        updated_at TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS instruments (
        instrument_token INTEGER PRIMARY KEY,
        tradingsymbol TEXT,
        name TEXT,
        exchange TEXT
    )
    ",
];

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

/// SQLite-backed store.
#[derive(Debug, Clone)]
pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    /// Open a pool against `database_url` and create missing tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the database cannot be
    /// opened, or the schema cannot be created.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        tracing::info!(max_connections, "Connected to ticker store");
        Self::with_pool(pool).await
    }

    /// Private in-memory database. The pool pins a single connection so
    /// the database lives as long as the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Wrap an existing pool and create missing tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Query(format!("schema: {e}")))?;
        }
        Ok(())
    }

    /// Insert or update an instrument reference row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn upsert_instrument(&self, instrument: &SubscribedInstrument) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO instruments (instrument_token, tradingsymbol, name, exchange)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (instrument_token) DO UPDATE SET
                tradingsymbol = excluded.tradingsymbol,
                name = excluded.name,
                exchange = excluded.exchange
            ",
        )
        .bind(i64::from(instrument.instrument_token))
        .bind(instrument.tradingsymbol.as_deref())
        .bind(instrument.name.as_deref())
        .bind(instrument.exchange.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    /// Close the pool, waiting for connections to be released.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn insert_credential(
        conn: &mut SqliteConnection,
        credential: &Credential,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO ticker_credentials (access_token, public_token, updated_at)
            VALUES (?1, ?2, ?3)
            ",
        )
        .bind(credential.access_token())
        .bind(credential.public_token())
        .bind(format_timestamp(credential.updated_at()))
        .execute(conn)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for SqlStore {
    async fn add(&self, token: InstrumentToken) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO ticker_subscriptions (instrument_token, created_at)
            VALUES (?1, ?2)
            ON CONFLICT (instrument_token) DO NOTHING
            ",
        )
        .bind(i64::from(token))
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove(&self, token: InstrumentToken) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM ticker_subscriptions WHERE instrument_token = ?1")
            .bind(i64::from(token))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<InstrumentToken>, StoreError> {
        let rows = sqlx::query(
            "SELECT instrument_token FROM ticker_subscriptions ORDER BY instrument_token",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        rows.iter().map(token_from_row).collect()
    }

    async fn list_with_instruments(&self) -> Result<Vec<SubscribedInstrument>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT s.instrument_token, i.tradingsymbol, i.name, i.exchange
            FROM ticker_subscriptions s
            LEFT JOIN instruments i ON i.instrument_token = s.instrument_token
            ORDER BY s.instrument_token
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                Ok(SubscribedInstrument {
                    instrument_token: token_from_row(row)?,
                    tradingsymbol: row.try_get::<Option<String>, _>("tradingsymbol").ok().flatten(),
                    name: row.try_get::<Option<String>, _>("name").ok().flatten(),
                    exchange: row.try_get::<Option<String>, _>("exchange").ok().flatten(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl CredentialRepository for SqlStore {
    async fn latest(&self) -> Result<Option<Credential>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT access_token, public_token, updated_at
            FROM ticker_credentials
            ORDER BY updated_at DESC, id DESC
            LIMIT 1
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let updated_at = row
            .try_get::<String, _>("updated_at")
            .map_err(|e| StoreError::Data(format!("updated_at: {e}")))?;

        Ok(Some(Credential::with_timestamp(
            row.try_get::<Option<String>, _>("access_token").ok().flatten(),
            row.try_get::<Option<String>, _>("public_token").ok().flatten(),
            parse_timestamp(&updated_at)?,
        )))
    }

    async fn replace(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM ticker_credentials")
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Self::insert_credential(&mut *tx, credential).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn append(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_credential(&mut conn, credential).await
    }
}

fn token_from_row(row: &SqliteRow) -> Result<InstrumentToken, StoreError> {
    let raw = row
        .try_get::<i64, _>("instrument_token")
        .map_err(|e| StoreError::Data(format!("instrument_token: {e}")))?;
    InstrumentToken::try_from(raw)
        .map_err(|_| StoreError::Data(format!("instrument_token out of range: {raw}")))
}

/// Fixed-width UTC timestamps so textual ordering matches time ordering.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Data(format!("updated_at {value:?}: {e}")))
}

// =============================================================================
// Tests
// =============================================================================
