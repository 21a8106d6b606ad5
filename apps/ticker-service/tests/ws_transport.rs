//! WebSocket Transport Integration Tests
//!
//! Runs the transport against a local tokio-tungstenite server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

use ticker_service::application::ports::{EventSink, TaggedEvent, TickerTransport, TransportFactory};
use ticker_service::infrastructure::config::ApiKey;
use ticker_service::infrastructure::ticker::{
    ConnectRetryConfig, WsTransportConfig, WsTransportFactory,
};
use ticker_service::{Credential, TransportErrorKind, TransportEvent};

const WAIT: Duration = Duration::from_secs(5);

fn factory(url: String, max_attempts: u32) -> WsTransportFactory {
    WsTransportFactory::new(WsTransportConfig {
        url,
        api_key: ApiKey::new("key".to_string()),
        retry: ConnectRetryConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            ..ConnectRetryConfig::default()
        }
        .with_max_attempts(max_attempts)
        .without_jitter(),
        heartbeat_interval: Duration::from_secs(10),
        idle_timeout: Duration::from_secs(30),
    })
}

fn start(
    factory: &WsTransportFactory,
) -> (Box<dyn TickerTransport>, mpsc::Receiver<TaggedEvent>) {
    let (tx, rx) = mpsc::channel(16);
    let credential = Credential::new(Some("secret-token".to_string()), None);
    let transport = factory.create(&credential, EventSink::new(3, tx)).unwrap();
    transport.connect().unwrap();
    (transport, rx)
}

async fn next_event(rx: &mut mpsc::Receiver<TaggedEvent>) -> TransportEvent {
    let tagged = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(tagged.generation, 3);
    tagged.event
}

#[tokio::test]
async fn streams_ticks_and_sends_control_frames() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (uri_tx, uri_rx) = oneshot::channel();
    let (frame_tx, mut frame_rx) = mpsc::channel(4);

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
            let _ = uri_tx.send(req.uri().to_string());
            Ok::<_, ErrorResponse>(resp)
        })
        .await
        .unwrap();
        let (mut write, mut read) = ws.split();

        let ticks = json!({
            "type": "ticks",
            "data": [{"instrument_token": 5633, "last_price": 2450}]
        });
        write.send(Message::Text(ticks.to_string().into())).await.unwrap();
        write
            .send(Message::Text(r#"{"type":"order","data":{}}"#.into()))
            .await
            .unwrap();

        while let Some(Ok(message)) = read.next().await {
            if let Message::Text(text) = message {
                frame_tx.send(text.to_string()).await.unwrap();
                break;
            }
        }
        write.send(Message::Close(None)).await.unwrap();
        while let Some(Ok(_)) = read.next().await {}
    });

    let (transport, mut events) = start(&factory(format!("ws://{addr}"), 2));

    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);
    assert!(transport.is_connected());

    let uri = uri_rx.await.unwrap();
    assert!(uri.contains("api_key=key"));
    assert!(uri.contains("access_token=secret-token"));

    let TransportEvent::TickBatch(items) = next_event(&mut events).await else {
        panic!("expected a tick batch");
    };
    assert_eq!(items[0]["instrument_token"], json!(5633));

    transport.subscribe(&[5633]).unwrap();
    let frame = tokio::time::timeout(WAIT, frame_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame, r#"{"a":"subscribe","v":[5633]}"#);

    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Disconnected { manual: false }
    );
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn close_reports_manual_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let (transport, mut events) = start(&factory(format!("ws://{addr}"), 2));
    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);

    transport.close();

    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Disconnected { manual: true }
    );
}

#[tokio::test]
async fn rejected_handshake_is_an_authentication_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ = tokio_tungstenite::accept_hdr_async(stream, |_req: &Request, _resp: Response| {
            let mut rejection = ErrorResponse::new(Some("forbidden".to_string()));
            *rejection.status_mut() = StatusCode::FORBIDDEN;
            Err(rejection)
        })
        .await;
    });

    let (_transport, mut events) = start(&factory(format!("ws://{addr}"), 5));

    let TransportEvent::Error(error) = next_event(&mut events).await else {
        panic!("expected an error event");
    };
    assert_eq!(error.kind, TransportErrorKind::Authentication);
}

#[tokio::test]
async fn unreachable_endpoint_gives_up_after_budget() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (transport, mut events) = start(&factory(format!("ws://{addr}"), 2));

    assert_eq!(next_event(&mut events).await, TransportEvent::NoReconnect);
    assert!(!transport.is_connected());
}
