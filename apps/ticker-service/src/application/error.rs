//! Application Errors
//!
//! Errors surfaced by the session manager and the subscription service.
//! The HTTP layer maps [`ServiceError`] onto status codes.

use thiserror::Error;

use crate::application::ports::StoreError;
use crate::domain::session::TransportError;

/// Session manager errors.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// No usable credential is known.
    #[error("no ticker credential available")]
    NoCredential,

    /// The transport could not be created or started.
    #[error("failed to start ticker transport: {0}")]
    TransportInit(#[source] TransportError),

    /// The session manager task has stopped.
    #[error("session manager is not running")]
    Unavailable,
}

/// Subscription service errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request is malformed.
    #[error("{0}")]
    Validation(String),

    /// No usable credential, or the venue rejected it.
    #[error("{0}")]
    Authentication(String),

    /// The requested data is not cached.
    #[error("{0}")]
    NotFound(String),

    /// The ticker transport could not be started.
    #[error("ticker transport error: {0}")]
    Transport(String),

    /// The durable store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The session manager is gone.
    #[error("ticker session manager is not running")]
    Unavailable,
}

impl From<SessionError> for ServiceError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NoCredential => {
                Self::Authentication("Access token not set. Please login first.".to_string())
            }
            SessionError::TransportInit(e) if e.is_authentication() => {
                Self::Authentication(e.message)
            }
            SessionError::TransportInit(e) => Self::Transport(e.to_string()),
            SessionError::Unavailable => Self::Unavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_maps_to_authentication() {
        let err = ServiceError::from(SessionError::NoCredential);
        assert!(matches!(err, ServiceError::Authentication(_)));
    }

    #[test]
    fn transport_failures_keep_their_kind() {
        let auth = ServiceError::from(SessionError::TransportInit(
            TransportError::authentication("rejected"),
        ));
        assert!(matches!(auth, ServiceError::Authentication(m) if m == "rejected"));

        let conn = ServiceError::from(SessionError::TransportInit(TransportError::connection(
            "bad url",
        )));
        assert!(matches!(conn, ServiceError::Transport(_)));
    }
}
