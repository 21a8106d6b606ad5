//! Tick Types and Cache
//!
//! A tick is the venue's latest market snapshot for one instrument. Ticks
//! are ephemeral: the cache keeps only the most recent one per token and is
//! empty after a restart.
//!
//! Raw batch items arrive as loosely typed JSON and are decoded one at a
//! time, so a single malformed item never poisons its siblings.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::subscription::InstrumentToken;

/// Undecoded tick item as delivered by the transport.
pub type RawTick = serde_json::Value;

// =============================================================================
// Tick Types
// =============================================================================

/// One side of the order book at a single price level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    /// Price of the level.
    pub price: Decimal,
    /// Quantity resting at this price.
    #[serde(default)]
    pub quantity: u64,
    /// Volume reported for the level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
    /// Number of orders at this price, when the venue sends it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orders: Option<u32>,
}

/// Market depth: bids and asks, best level first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Depth {
    /// Bid levels.
    #[serde(default)]
    pub buy: Vec<DepthLevel>,
    /// Ask levels.
    #[serde(default)]
    pub sell: Vec<DepthLevel>,
}

impl Depth {
    /// Best bid, if any.
    #[must_use]
    pub fn best_bid(&self) -> Option<&DepthLevel> {
        self.buy.first()
    }

    /// Best ask, if any.
    #[must_use]
    pub fn best_ask(&self) -> Option<&DepthLevel> {
        self.sell.first()
    }
}

/// Latest market snapshot for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Instrument the tick belongs to.
    pub instrument_token: InstrumentToken,
    /// Last traded price.
    pub last_price: Decimal,
    /// Time of the last trade.
    #[serde(default)]
    pub last_trade_time: Option<DateTime<Utc>>,
    /// Quantity of the last trade.
    #[serde(default)]
    pub last_traded_quantity: Option<u64>,
    /// Cumulative traded volume for the day.
    #[serde(default, alias = "volume_traded")]
    pub volume: Option<u64>,
    /// Order book snapshot, present in full mode only.
    #[serde(default)]
    pub depth: Option<Depth>,
}

/// Reasons a raw batch item cannot become a [`Tick`].
#[derive(Debug, thiserror::Error)]
pub enum TickDecodeError {
    /// The item does not have the shape of a tick.
    #[error("malformed tick: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The item decoded but carries an impossible price.
    #[error("negative last price {price} for instrument {instrument_token}")]
    NegativePrice {
        /// Instrument of the rejected item.
        instrument_token: InstrumentToken,
        /// The offending price.
        price: Decimal,
    },
}

impl Tick {
    /// Decode one raw batch item.
    ///
    /// # Errors
    ///
    /// Returns an error if the item is not a tick object or its price is
    /// negative.
    pub fn from_raw(raw: RawTick) -> Result<Self, TickDecodeError> {
        let tick: Self = serde_json::from_value(raw)?;
        if tick.last_price < Decimal::ZERO {
            return Err(TickDecodeError::NegativePrice {
                instrument_token: tick.instrument_token,
                price: tick.last_price,
            });
        }
        Ok(tick)
    }
}

// =============================================================================
// Tick Cache
// =============================================================================

/// Why a depth lookup came back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DepthLookupError {
    /// No tick has been received for the instrument.
    #[error("no tick for instrument {0}")]
    NoTick(InstrumentToken),
    /// A tick exists but it carries no depth.
    #[error("no depth for instrument {0}")]
    NoDepth(InstrumentToken),
}

/// Result of applying one transport batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Items stored in the cache.
    pub applied: usize,
    /// Items skipped because they failed to decode.
    pub rejected: usize,
}

/// Process-local map from instrument token to its latest tick.
#[derive(Debug, Default)]
pub struct TickCache {
    ticks: RwLock<HashMap<InstrumentToken, Tick>>,
}

impl TickCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a tick, replacing any previous one for the same token.
    pub fn put(&self, tick: Tick) {
        self.ticks.write().insert(tick.instrument_token, tick);
    }

    /// Latest tick for a token.
    #[must_use]
    pub fn get(&self, token: InstrumentToken) -> Option<Tick> {
        self.ticks.read().get(&token).cloned()
    }

    /// Depth of the latest tick for a token.
    ///
    /// # Errors
    ///
    /// Distinguishes a token with no tick from a tick without depth.
    pub fn depth(&self, token: InstrumentToken) -> Result<Depth, DepthLookupError> {
        let ticks = self.ticks.read();
        let tick = ticks.get(&token).ok_or(DepthLookupError::NoTick(token))?;
        tick.depth.clone().ok_or(DepthLookupError::NoDepth(token))
    }

    /// Number of instruments with a cached tick.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ticks.read().len()
    }

    /// Whether the cache holds no ticks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ticks.read().is_empty()
    }

    /// Decode and store a batch in delivery order.
    ///
    /// Each item is decoded independently; failures are logged and counted
    /// without affecting the rest of the batch.
    pub fn apply_batch(&self, items: Vec<RawTick>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut decoded = Vec::with_capacity(items.len());

        for item in items {
            match Tick::from_raw(item) {
                Ok(tick) => decoded.push(tick),
                Err(e) => {
                    outcome.rejected += 1;
                    tracing::warn!(error = %e, "Skipping tick item");
                }
            }
        }

        if !decoded.is_empty() {
            let mut ticks = self.ticks.write();
            for tick in decoded {
                ticks.insert(tick.instrument_token, tick);
                outcome.applied += 1;
            }
        }

        outcome
    }
}

// =============================================================================
// Tests
// =============================================================================
