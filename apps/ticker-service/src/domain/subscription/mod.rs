//! Subscription Types
//!
//! Domain types for the set of instrument tokens the ticker streams.
//!
//! # Design
//!
//! The durable store holds the authoritative set. The session manager keeps
//! a `SubscriptionSet` mirror of what the live transport has been told, so
//! an incremental unsubscribe only sends tokens the venue actually knows.

use std::collections::BTreeSet;

// =============================================================================
// Types
// =============================================================================

/// Venue-assigned numeric identifier of a tradable instrument.
pub type InstrumentToken = u32;

/// Ordered, duplicate-free set of instrument tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    tokens: BTreeSet<InstrumentToken>,
}

impl SubscriptionSet {
    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tokens: BTreeSet::new(),
        }
    }

    /// Remove tokens, returning the ones that were present.
    pub fn remove_all(&mut self, tokens: &[InstrumentToken]) -> Vec<InstrumentToken> {
        tokens
            .iter()
            .copied()
            .filter(|token| self.tokens.remove(token))
            .collect()
    }

    /// Drop every token.
    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    /// Whether the token is in the set.
    #[must_use]
    pub fn contains(&self, token: InstrumentToken) -> bool {
        self.tokens.contains(&token)
    }

    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Tokens in ascending order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<InstrumentToken> {
        self.tokens.iter().copied().collect()
    }
}

impl FromIterator<InstrumentToken> for SubscriptionSet {
    fn from_iter<I: IntoIterator<Item = InstrumentToken>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

/// Deduplicate caller-supplied tokens while keeping first-seen order.
#[must_use]
pub fn dedup_tokens(tokens: &[InstrumentToken]) -> Vec<InstrumentToken> {
    let mut seen = BTreeSet::new();
    tokens
        .iter()
        .copied()
        .filter(|token| seen.insert(*token))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
