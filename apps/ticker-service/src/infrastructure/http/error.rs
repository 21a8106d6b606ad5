//! API Error Mapping
//!
//! Every failed request answers `{"success": false, "error": ..., "code": ...}`.
//! Full detail for server-side failures goes to the log, not the body.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ServiceError;

/// Error returned by API handlers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Malformed input.
    #[error("{0}")]
    BadRequest(String),
    /// Missing or rejected credential.
    #[error("{0}")]
    Unauthorized(String),
    /// Nothing cached for the request.
    #[error("{0}")]
    NotFound(String),
    /// Store, transport or session failure.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Create a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(message) => Self::BadRequest(message),
            ServiceError::Authentication(message) => Self::Unauthorized(message),
            ServiceError::NotFound(message) => Self::NotFound(message),
            ServiceError::Transport(message) => {
                tracing::error!(error = %message, "Ticker transport failed to start");
                Self::Internal("Failed to start ticker".to_string())
            }
            ServiceError::Store(e) => {
                tracing::error!(error = %e, "Store operation failed");
                Self::Internal("Database operation failed".to_string())
            }
            ServiceError::Unavailable => {
                tracing::error!("Session manager is not running");
                Self::Internal("Ticker session is unavailable".to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: match &self {
                Self::BadRequest(m)
                | Self::Unauthorized(m)
                | Self::NotFound(m)
                | Self::Internal(m) => m,
            },
            code: self.code(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::application::ports::StoreError;

    #[test_case(ServiceError::Validation("bad".into()), StatusCode::BAD_REQUEST ; "validation")]
    #[test_case(ServiceError::Authentication("login".into()), StatusCode::UNAUTHORIZED ; "authentication")]
    #[test_case(ServiceError::NotFound("none".into()), StatusCode::NOT_FOUND ; "not found")]
    #[test_case(ServiceError::Transport("refused".into()), StatusCode::INTERNAL_SERVER_ERROR ; "transport")]
    #[test_case(ServiceError::Store(StoreError::Query("locked".into())), StatusCode::INTERNAL_SERVER_ERROR ; "store")]
    #[test_case(ServiceError::Unavailable, StatusCode::INTERNAL_SERVER_ERROR ; "unavailable")]
    fn service_errors_map_to_status(err: ServiceError, status: StatusCode) {
        assert_eq!(ApiError::from(err).status(), status);
    }

    #[test]
    fn store_detail_is_not_exposed() {
        let err = ApiError::from(ServiceError::Store(StoreError::Query(
            "no such table: ticker_credentials".into(),
        )));
        assert!(!err.to_string().contains("ticker_credentials"));
    }

    #[tokio::test]
    async fn body_has_error_envelope() {
        let response = ApiError::bad_request("tokens must be an array").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "success": false,
                "error": "tokens must be an array",
                "code": "BAD_REQUEST"
            })
        );
    }
}
