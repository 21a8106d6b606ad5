//! Ticker Credentials
//!
//! The access/public token pair the venue issues after login. Exactly one
//! credential is current at a time: the most recently persisted one.

use std::fmt;

use chrono::{DateTime, Utc};

/// Venue session credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: Option<String>,
    public_token: Option<String>,
    updated_at: DateTime<Utc>,
}

impl Credential {
    /// Create a credential stamped with the current time.
    #[must_use]
    pub fn new(access_token: Option<String>, public_token: Option<String>) -> Self {
        Self::with_timestamp(access_token, public_token, Utc::now())
    }

    /// Create a credential with an explicit timestamp (used when loading).
    #[must_use]
    pub fn with_timestamp(
        access_token: Option<String>,
        public_token: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.filter(|t| !t.trim().is_empty()),
            public_token: public_token.filter(|t| !t.trim().is_empty()),
            updated_at,
        }
    }

    /// Access token, if one is present.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Public token, if one is present.
    #[must_use]
    pub fn public_token(&self) -> Option<&str> {
        self.public_token.as_deref()
    }

    /// When the credential was stored.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether the credential can open a ticker session.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.access_token.is_some()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("public_token", &self.public_token.as_ref().map(|_| "[REDACTED]"))
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_tokens_are_treated_as_absent() {
        let credential = Credential::new(Some("  ".to_string()), Some(String::new()));
        assert!(credential.access_token().is_none());
        assert!(credential.public_token().is_none());
        assert!(!credential.is_usable());
    }

    #[test]
    fn debug_redacts_tokens() {
        let credential = Credential::new(Some("secret-access".to_string()), Some("pub".to_string()));
        let debug = format!("{credential:?}");
        assert!(!debug.contains("secret-access"));
        assert!(debug.contains("[REDACTED]"));
    }
}
