//! HTTP API Integration Tests
//!
//! Exercises the router end to end against an in-memory SQLite store and a
//! recording transport factory.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use ticker_service::application::ports::{
    CredentialRepository, NoOpNotifier, SubscribedInstrument, SubscriptionRepository,
};
use ticker_service::infrastructure::persistence::SqlStore;
use ticker_service::infrastructure::ticker::MockTransportFactory;
use ticker_service::{
    AppState, Credential, SessionConfig, SessionManager, TickCache, TickerService, TransportEvent,
    build_router, init_metrics,
};

struct TestApp {
    router: Router,
    service: Arc<TickerService>,
    store: Arc<SqlStore>,
    factory: Arc<MockTransportFactory>,
}

impl TestApp {
    async fn new() -> Self {
        let store = Arc::new(SqlStore::in_memory().await.unwrap());
        let factory = Arc::new(MockTransportFactory::new());
        let cache = Arc::new(TickCache::new());

        let (session, _task) = SessionManager::spawn(
            SessionConfig::default(),
            factory.clone(),
            store.clone(),
            cache.clone(),
            Arc::new(NoOpNotifier),
            CancellationToken::new(),
        );
        let service = Arc::new(TickerService::new(
            session,
            store.clone(),
            store.clone(),
            cache,
        ));
        let router = build_router(Arc::new(AppState::new(service.clone(), "test-0.0.1")));

        Self {
            router,
            service,
            store,
            factory,
        }
    }

    async fn with_token() -> Self {
        let app = Self::new().await;
        let (status, _) = app
            .send(
                Method::POST,
                "/set-access-token",
                Some(json!({"access_token": "abc"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        app
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, text) = self.send_raw(method, uri, body.map(|b| b.to_string())).await;
        let json = serde_json::from_str(&text).unwrap_or(Value::Null);
        (status, json)
    }

    async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        body: Option<String>,
    ) -> (StatusCode, String) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                builder = builder.header("content-type", "application/json");
                Body::from(body)
            }
            None => Body::empty(),
        };
        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    /// Emit on the current transport and wait for the session to process it.
    async fn emit(&self, event: TransportEvent) {
        self.factory.latest().unwrap().emit(event).await;
        self.service.session().status().await.unwrap();
    }
}

fn assert_error(body: &Value, code: &str) {
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!(code));
    assert!(body["error"].is_string());
}

// =============================================================================
// Subscriptions
// =============================================================================

#[tokio::test]
async fn subscribe_without_credential_is_unauthorized() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(Method::POST, "/subscribe", Some(json!({"tokens": [5633]})))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_error(&body, "UNAUTHORIZED");
    assert!(app.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn subscribe_persists_and_lists_tokens() {
    let app = TestApp::with_token().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/subscribe",
            Some(json!({"tokens": [5633, 738_561]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "subscribed": [5633, 738_561]}));
    assert_eq!(app.store.list().await.unwrap(), vec![5633, 738_561]);

    let (status, body) = app.send(Method::GET, "/subscriptions", None).await;
    assert_eq!(status, StatusCode::OK);
    let listed: Vec<u64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["instrument_token"].as_u64().unwrap())
        .collect();
    assert_eq!(listed, vec![5633, 738_561]);
    assert_eq!(body["data"][0]["ltp"], Value::Null);
    assert_eq!(body["data"][0]["tradingsymbol"], Value::Null);
}

#[tokio::test]
async fn subscribing_twice_keeps_one_row() {
    let app = TestApp::with_token().await;

    for _ in 0..2 {
        let (status, _) = app
            .send(Method::POST, "/subscribe", Some(json!({"tokens": [5633]})))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(app.store.list().await.unwrap(), vec![5633]);
}

#[tokio::test]
async fn subscribe_restarts_session_once_per_call() {
    let app = TestApp::with_token().await;
    assert_eq!(app.factory.created_count(), 1);

    app.send(
        Method::POST,
        "/subscribe",
        Some(json!({"tokens": [1, 2, 3, 2]})),
    )
    .await;

    assert_eq!(app.factory.created_count(), 2);
}

#[tokio::test]
async fn empty_subscribe_initialises_session_and_adds_nothing() {
    let app = TestApp::new().await;
    app.service
        .session()
        .update_credential(Credential::new(Some("abc".to_string()), None))
        .await
        .unwrap();

    let (status, body) = app
        .send(Method::POST, "/subscribe", Some(json!({"tokens": []})))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert!(body["message"].is_string());
    assert_eq!(app.factory.created_count(), 1);
    assert!(app.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_subscribe_without_credential_succeeds_and_starts_nothing() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(Method::POST, "/subscribe", Some(json!({"tokens": []})))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert!(body["message"].is_string());
    assert_eq!(app.factory.created_count(), 0);
    assert!(app.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_subscribe_bodies_are_bad_requests() {
    let app = TestApp::with_token().await;

    for body in [
        json!({"tokens": "5633"}),
        json!({"tokens": [5633, "x"]}),
        json!({}),
    ] {
        let (status, response) = app.send(Method::POST, "/subscribe", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_error(&response, "BAD_REQUEST");
    }

    let (status, _) = app
        .send_raw(Method::POST, "/subscribe", Some("{not json".to_string()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn status_follows_subscribe_and_unsubscribe() {
    let app = TestApp::with_token().await;

    app.send(Method::POST, "/subscribe", Some(json!({"tokens": [5633]})))
        .await;
    let (_, body) = app.send(Method::GET, "/status", None).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["numSubscriptions"], json!(1));
    assert_eq!(body["subscriptions"], json!([5633]));
    assert_eq!(body["tickerConnected"], json!(false));

    let (status, body) = app
        .send(Method::POST, "/unsubscribe", Some(json!({"tokens": [5633]})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscribed"], json!([]));

    let (_, body) = app.send(Method::GET, "/status", None).await;
    assert_eq!(body["numSubscriptions"], json!(0));
    assert_eq!(body["subscriptions"], json!([]));
}

#[tokio::test]
async fn unsubscribe_validates_input_and_credential() {
    let app = TestApp::new().await;
    let (status, _) = app
        .send(Method::POST, "/unsubscribe", Some(json!({"tokens": []})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(Method::POST, "/unsubscribe", Some(json!({"tokens": [1]})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_error(&body, "UNAUTHORIZED");
}

// =============================================================================
// Ticks and Depth
// =============================================================================

#[tokio::test]
async fn tick_lookup_tracks_latest_batch() {
    let app = TestApp::with_token().await;

    let (status, body) = app.send(Method::GET, "/tick?instrument_token=5633", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "NOT_FOUND");

    app.emit(TransportEvent::TickBatch(vec![
        json!({"instrument_token": 5633, "last_price": 100}),
    ]))
    .await;
    let (status, body) = app.send(Method::GET, "/tick?instrument_token=5633", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tick"]["instrument_token"], json!(5633));
    assert_eq!(body["tick"]["last_price"], json!("100"));

    app.emit(TransportEvent::TickBatch(vec![
        json!({"instrument_token": 5633, "last_price": 102}),
    ]))
    .await;
    let (_, body) = app.send(Method::GET, "/tick?instrument_token=5633", None).await;
    assert_eq!(body["tick"]["last_price"], json!("102"));
}

#[tokio::test]
async fn tick_query_must_be_numeric() {
    let app = TestApp::new().await;
    for uri in ["/tick", "/tick?instrument_token=abc", "/depth?instrument_token="] {
        let (status, body) = app.send(Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_error(&body, "BAD_REQUEST");
    }
}

#[tokio::test]
async fn depth_distinguishes_missing_tick_and_missing_depth() {
    let app = TestApp::with_token().await;

    let (status, body) = app.send(Method::GET, "/depth?instrument_token=5633", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("tick"));

    app.emit(TransportEvent::TickBatch(vec![
        json!({"instrument_token": 5633, "last_price": 100}),
    ]))
    .await;
    let (status, body) = app.send(Method::GET, "/depth?instrument_token=5633", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("depth"));

    app.emit(TransportEvent::TickBatch(vec![json!({
        "instrument_token": 5633,
        "last_price": 100,
        "depth": {
            "buy": [{"price": 99.5, "quantity": 10, "volume": 99}],
            "sell": [{"price": 100.5, "quantity": 5, "orders": 1}]
        }
    })]))
    .await;
    let (status, body) = app.send(Method::GET, "/depth?instrument_token=5633", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["depth"]["buy"][0]["quantity"], json!(10));
    assert_eq!(body["depth"]["buy"][0]["volume"], json!(99));
    assert!(body["depth"]["buy"][0].get("orders").is_none());
    assert_eq!(body["depth"]["sell"][0]["orders"], json!(1));
    assert!(body["depth"]["sell"][0].get("volume").is_none());
}

#[tokio::test]
async fn subscription_listing_merges_reference_data_and_cache() {
    let app = TestApp::with_token().await;
    app.store
        .upsert_instrument(&SubscribedInstrument {
            instrument_token: 5633,
            tradingsymbol: Some("ACC".to_string()),
            name: Some("ACC LIMITED".to_string()),
            exchange: Some("NSE".to_string()),
        })
        .await
        .unwrap();
    app.send(Method::POST, "/subscribe", Some(json!({"tokens": [5633]})))
        .await;
    app.emit(TransportEvent::TickBatch(vec![json!({
        "instrument_token": 5633,
        "last_price": 2450,
        "depth": {
            "buy": [{"price": 2449, "quantity": 40, "volume": 120, "orders": 3}],
            "sell": [{"price": 2451, "quantity": 15, "volume": 75}]
        }
    })]))
    .await;

    let (status, body) = app.send(Method::GET, "/subscriptions", None).await;
    assert_eq!(status, StatusCode::OK);
    let row = &body["data"][0];
    assert_eq!(row["tradingsymbol"], json!("ACC"));
    assert_eq!(row["exchange"], json!("NSE"));
    assert_eq!(row["ltp"], json!("2450"));
    assert_eq!(row["tick_time"], Value::Null);
    assert_eq!(row["bid_price"], json!("2449"));
    assert_eq!(row["bid_quantity"], json!(40));
    assert_eq!(row["bid_volume"], json!(120));
    assert_eq!(row["bid_orders"], json!(3));
    assert_eq!(row["ask_price"], json!("2451"));
    assert_eq!(row["ask_quantity"], json!(15));
    assert_eq!(row["ask_volume"], json!(75));
    assert_eq!(row["ask_orders"], Value::Null);
}

// =============================================================================
// Credentials and Session Control
// =============================================================================

#[tokio::test]
async fn set_access_token_requires_access_token() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/set-access-token",
            Some(json!({"public_token": "pub"})),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "BAD_REQUEST");
    assert!(app.store.latest().await.unwrap().is_none());
    assert_eq!(app.factory.created_count(), 0);
}

#[tokio::test]
async fn set_access_token_persists_and_starts_session() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/set-access-token",
            Some(json!({"access_token": "abc", "public_token": "pub"})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    let stored = app.store.latest().await.unwrap().unwrap();
    assert_eq!(stored.access_token(), Some("abc"));
    assert_eq!(stored.public_token(), Some("pub"));
    assert_eq!(
        app.factory.latest().unwrap().access_token().as_deref(),
        Some("abc")
    );
}

#[tokio::test]
async fn provide_access_token_rotates_the_session() {
    let app = TestApp::with_token().await;

    let (status, _) = app
        .send(
            Method::POST,
            "/provide-access-token",
            Some(json!({"access_token": "fresh"})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.factory.created_count(), 2);
    assert!(app.factory.transport(0).unwrap().is_closed());
    assert_eq!(
        app.store.latest().await.unwrap().unwrap().access_token(),
        Some("fresh")
    );
}

#[tokio::test]
async fn disconnect_stops_the_session() {
    let app = TestApp::with_token().await;
    app.emit(TransportEvent::Connected).await;

    let (status, body) = app.send(Method::POST, "/disconnect", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    let snapshot = app.service.session().status().await.unwrap();
    assert!(snapshot.manual_stop);
    assert!(!snapshot.connected);
    assert!(app.factory.latest().unwrap().is_closed());
}

// =============================================================================
// Health and Metrics
// =============================================================================

#[tokio::test]
async fn probes_follow_connection_state() {
    let app = TestApp::new().await;

    let (status, text) = app.send_raw(Method::GET, "/healthz", None).await;
    assert_eq!((status, text.as_str()), (StatusCode::OK, "OK"));

    let (status, body) = app.send(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], json!("unhealthy"));

    let (status, _) = app.send(Method::POST, "/set-access-token", Some(json!({"access_token": "abc"}))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, text) = app.send_raw(Method::GET, "/readyz", None).await;
    assert_eq!((status, text.as_str()), (StatusCode::SERVICE_UNAVAILABLE, "NOT READY"));
    let (_, body) = app.send(Method::GET, "/health", None).await;
    assert_eq!(body["status"], json!("degraded"));

    app.emit(TransportEvent::Connected).await;
    let (status, text) = app.send_raw(Method::GET, "/readyz", None).await;
    assert_eq!((status, text.as_str()), (StatusCode::OK, "READY"));
    let (status, body) = app.send(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["version"], json!("test-0.0.1"));
    assert_eq!(body["session"]["state"], json!("connected"));
}

#[tokio::test]
async fn metrics_endpoint_renders_prometheus_text() {
    init_metrics();
    let app = TestApp::with_token().await;
    app.emit(TransportEvent::TickBatch(vec![
        json!({"instrument_token": 1, "last_price": 1}),
    ]))
    .await;

    let (status, text) = app.send_raw(Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("ticker_ticks_received_total"));
}
