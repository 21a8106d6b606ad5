//! API Handlers
//!
//! JSON routes over [`TickerService`](crate::application::services::TickerService).
//! Request bodies are taken as raw JSON so shape errors come back as 400s
//! with the standard error envelope.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ApiError;
use super::server::AppState;
use crate::application::services::{SubscribeOutcome, SubscriptionView};
use crate::domain::session::SessionState;
use crate::domain::subscription::InstrumentToken;
use crate::domain::tick::{Depth, Tick};

// =============================================================================
// Request / Response Types
// =============================================================================

/// Query string of the tick and depth routes.
#[derive(Debug, Deserialize)]
pub struct InstrumentQuery {
    instrument_token: Option<String>,
}

/// Body of the access token routes.
#[derive(Debug, Deserialize)]
pub struct AccessTokenRequest {
    access_token: Option<String>,
    #[serde(default)]
    public_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    success: bool,
    message: &'static str,
}

impl MessageResponse {
    const fn ok(message: &'static str) -> Json<Self> {
        Json(Self {
            success: true,
            message,
        })
    }
}

#[derive(Debug, Serialize)]
struct SubscribedResponse {
    success: bool,
    subscribed: Vec<InstrumentToken>,
}

#[derive(Debug, Serialize)]
struct TickResponse {
    success: bool,
    tick: Tick,
}

#[derive(Debug, Serialize)]
struct DepthResponse {
    success: bool,
    depth: Depth,
}

#[derive(Debug, Serialize)]
struct SubscriptionsResponse {
    success: bool,
    data: Vec<SubscriptionView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    success: bool,
    ticker_connected: bool,
    state: SessionState,
    num_subscriptions: usize,
    subscriptions: Vec<InstrumentToken>,
}

// =============================================================================
// Handlers
// =============================================================================

/// `POST /subscribe`
pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let tokens = parse_tokens(&body)?;

    let response = match state.service.subscribe(&tokens).await? {
        SubscribeOutcome::NothingRequested => {
            MessageResponse::ok("No tokens provided; ticker session ensured").into_response()
        }
        SubscribeOutcome::Subscribed(subscribed) => Json(SubscribedResponse {
            success: true,
            subscribed,
        })
        .into_response(),
    };
    Ok(response)
}

/// `POST /unsubscribe`
pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    let tokens = parse_tokens(&body)?;
    let subscribed = state.service.unsubscribe(&tokens).await?;
    Ok(Json(SubscribedResponse {
        success: true,
        subscribed,
    }))
}

/// `GET /tick?instrument_token=`
pub async fn tick(
    State(state): State<Arc<AppState>>,
    query: Result<Query<InstrumentQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let token = parse_instrument(&query)?;
    let tick = state.service.latest_tick(token)?;
    Ok(Json(TickResponse {
        success: true,
        tick,
    }))
}

/// `GET /depth?instrument_token=`
pub async fn depth(
    State(state): State<Arc<AppState>>,
    query: Result<Query<InstrumentQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let token = parse_instrument(&query)?;
    let depth = state.service.depth(token)?;
    Ok(Json(DepthResponse {
        success: true,
        depth,
    }))
}

/// `GET /subscriptions`
pub async fn subscriptions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let data = state.service.list_subscriptions().await?;
    Ok(Json(SubscriptionsResponse {
        success: true,
        data,
    }))
}

/// `GET /status`
pub async fn status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let view = state.service.status().await?;
    Ok(Json(StatusResponse {
        success: true,
        ticker_connected: view.connected(),
        state: view.session.state,
        num_subscriptions: view.subscriptions.len(),
        subscriptions: view.subscriptions,
    }))
}

/// `POST /set-access-token`
pub async fn set_access_token(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AccessTokenRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body?;
    state
        .service
        .set_access_token(request.access_token, request.public_token)
        .await?;
    Ok(MessageResponse::ok("Access token set and ticker restarted"))
}

/// `POST /provide-access-token`
pub async fn provide_access_token(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AccessTokenRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body?;
    state
        .service
        .provide_access_token(request.access_token, request.public_token)
        .await?;
    Ok(MessageResponse::ok("Access token stored and ticker restarted"))
}

/// `POST /disconnect`
pub async fn disconnect(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    state.service.disconnect().await?;
    Ok(MessageResponse::ok("Ticker disconnected"))
}

// =============================================================================
// Input Parsing
// =============================================================================

/// Extract `tokens` from a request body. Every element must be a JSON
/// integer that fits an instrument token.
fn parse_tokens(body: &Value) -> Result<Vec<InstrumentToken>, ApiError> {
    let items = body
        .get("tokens")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::bad_request("tokens must be an array of instrument tokens"))?;

    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|n| InstrumentToken::try_from(n).ok())
                .ok_or_else(|| ApiError::bad_request(format!("invalid instrument token: {item}")))
        })
        .collect()
}

fn parse_instrument(query: &InstrumentQuery) -> Result<InstrumentToken, ApiError> {
    let raw = query
        .instrument_token
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("instrument_token is required"))?;
    raw.trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid instrument_token: {raw}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    #[test]
    fn parses_token_arrays() {
        assert_eq!(
            parse_tokens(&json!({"tokens": [5633, 738_561]})).unwrap(),
            vec![5633, 738_561]
        );
        assert!(parse_tokens(&json!({"tokens": []})).unwrap().is_empty());
    }

    #[test_case(json!({}) ; "missing field")]
    #[test_case(json!({"tokens": 5633}) ; "not an array")]
    #[test_case(json!({"tokens": ["5633"]}) ; "string element")]
    #[test_case(json!({"tokens": [1.5]}) ; "fractional element")]
    #[test_case(json!({"tokens": [-1]}) ; "negative element")]
    #[test_case(json!({"tokens": [4_294_967_296_u64]}) ; "out of range")]
    #[test_case(json!([1, 2]) ; "bare array")]
    fn rejects_malformed_tokens(body: Value) {
        assert!(matches!(parse_tokens(&body), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn instrument_query_must_be_numeric() {
        let query = |v: Option<&str>| InstrumentQuery {
            instrument_token: v.map(str::to_string),
        };
        assert_eq!(parse_instrument(&query(Some("5633"))).unwrap(), 5633);
        assert!(parse_instrument(&query(None)).is_err());
        assert!(parse_instrument(&query(Some("abc"))).is_err());
    }
}
