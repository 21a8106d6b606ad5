//! Ticker Service Binary
//!
//! Starts the live tick ingestion and subscription service.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ticker-service
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `KITE_API_KEY`: venue API key
//!
//! ## Optional
//! - `TICKER_WS_URL`: ticker endpoint (default: wss://ws.kite.trade)
//! - `DATABASE_URL`: SQLite URL (default: sqlite://ticker.db?mode=rwc)
//! - `TICKER_HTTP_PORT`: API, health and metrics port (default: 3000)
//! - `TICKER_RECONNECT_DELAY_SECS`: delay before reconnecting (default: 5)
//! - `SLACK_WEBHOOK_URL`: operator alerts (default: disabled)
//! - `OTEL_ENABLED`: export spans over OTLP (default: false)
//! - `RUST_LOG`: log filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ticker_service::application::ports::{
    CredentialRepository, NoOpNotifier, Notifier, SubscriptionRepository, TransportFactory,
};
use ticker_service::infrastructure::http::{AppState, HttpServer};
use ticker_service::infrastructure::notify::SlackNotifier;
use ticker_service::infrastructure::persistence::SqlStore;
use ticker_service::infrastructure::telemetry;
use ticker_service::infrastructure::ticker::{WsTransportConfig, WsTransportFactory};
use ticker_service::{
    ServiceConfig, SessionConfig, SessionManager, TickCache, TickerService, init_metrics,
};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Upper bound on waiting for the HTTP server to drain.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting ticker service");

    let _metrics_handle = init_metrics();

    let config = ServiceConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let store = Arc::new(
        SqlStore::connect(&config.database.url, config.database.max_connections)
            .await
            .context("failed to open subscription store")?,
    );
    let subscriptions: Arc<dyn SubscriptionRepository> = store.clone();
    let credentials: Arc<dyn CredentialRepository> = store.clone();

    let cache = Arc::new(TickCache::new());

    let factory: Arc<dyn TransportFactory> = Arc::new(WsTransportFactory::new(
        WsTransportConfig::from_settings(config.api_key.clone(), &config.ticker),
    ));

    let notifier: Arc<dyn Notifier> = match &config.notifications.slack_webhook_url {
        Some(url) => Arc::new(SlackNotifier::new(url.clone()).context("failed to build Slack client")?),
        None => Arc::new(NoOpNotifier),
    };

    let session_config = SessionConfig {
        reconnect_delay: config.ticker.reconnect_delay,
        event_capacity: config.ticker.event_channel_capacity,
        ..SessionConfig::default()
    };
    let (session, session_task) = SessionManager::spawn(
        session_config,
        factory,
        Arc::clone(&subscriptions),
        Arc::clone(&cache),
        notifier,
        shutdown_token.clone(),
    );

    let service = Arc::new(TickerService::new(
        session.clone(),
        subscriptions,
        credentials,
        cache,
    ));

    match service.restore().await {
        Ok(true) => tracing::info!("Ticker resumed from stored credential"),
        Ok(false) => {}
        Err(e) => tracing::error!(error = %e, "Failed to restore ticker session"),
    }

    let http_server = HttpServer::new(
        config.server.http_port,
        Arc::new(AppState::new(service, env!("CARGO_PKG_VERSION"))),
        shutdown_token.clone(),
    );
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tracing::info!("Ticker service ready");

    await_shutdown().await;

    if let Err(e) = session.stop(true).await {
        tracing::warn!(error = %e, "Session manager already stopped");
    }
    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        join_task("http_server", http_task).await;
        join_task("session_manager", session_task).await;
    })
    .await
    .is_err()
    {
        tracing::warn!("Shutdown timed out");
    }

    store.close().await;
    tracing::info!("Ticker service stopped");
    Ok(())
}

/// Log the parsed configuration.
/// Await a spawned task, logging a panic or cancellation.
///
/// Returns whether the task ran to completion.
async fn join_task(name: &str, task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(task = name, error = %e, panicked = e.is_panic(), "Task failed");
            false
        }
    }
}

fn log_config(config: &ServiceConfig) {
    tracing::info!(
        http_port = config.server.http_port,
        database_url = %config.database.url,
        reconnect_delay_secs = config.ticker.reconnect_delay.as_secs(),
        connect_max_attempts = config.ticker.connect_max_attempts,
        slack_alerts = config.notifications.slack_webhook_url.is_some(),
        "Configuration loaded"
    );
    tracing::debug!(ws_url = %config.ticker.ws_url, "Ticker endpoint");
}

/// Load .env from the current directory or the nearest ancestor that has one.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Wait for SIGINT or SIGTERM.
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
