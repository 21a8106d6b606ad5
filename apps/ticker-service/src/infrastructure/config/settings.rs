//! Service Configuration Settings
//!
//! Configuration types for the ticker service, loaded from environment
//! variables. Every value except the venue API key has a default.

use std::time::Duration;

/// Venue API key, shared by every ticker session.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key.
    #[must_use]
    pub const fn new(key: String) -> Self {
        Self(key)
    }

    /// The raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Ticker transport and session settings.
#[derive(Debug, Clone)]
pub struct TickerSettings {
    /// WebSocket endpoint of the venue ticker.
    pub ws_url: String,
    /// Fixed delay before the session manager reconnects.
    pub reconnect_delay: Duration,
    /// Connect attempts the transport makes before giving up.
    pub connect_max_attempts: u32,
    /// First connect retry delay.
    pub connect_delay_initial: Duration,
    /// Upper bound on the connect retry delay.
    pub connect_delay_max: Duration,
    /// Connect retry delay multiplier.
    pub connect_delay_multiplier: f64,
    /// Capacity of the transport event channel.
    pub event_channel_capacity: usize,
}

impl Default for TickerSettings {
    fn default() -> Self {
        Self {
            ws_url: "wss://ws.kite.trade".to_string(),
            reconnect_delay: Duration::from_secs(5),
            connect_max_attempts: 10,
            connect_delay_initial: Duration::from_millis(500),
            connect_delay_max: Duration::from_secs(30),
            connect_delay_multiplier: 2.0,
            event_channel_capacity: 1024,
        }
    }
}

/// Relational store settings.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Connection URL.
    pub url: String,
    /// Pool size.
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://ticker.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Port for the API, health and metrics routes.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 3000 }
    }
}

/// Operator alert settings.
#[derive(Clone, Default)]
pub struct NotificationSettings {
    /// Slack incoming-webhook URL. Alerts are disabled when unset.
    pub slack_webhook_url: Option<String>,
}

impl std::fmt::Debug for NotificationSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSettings")
            .field(
                "slack_webhook_url",
                &self.slack_webhook_url.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Venue API key.
    pub api_key: ApiKey,
    /// Ticker settings.
    pub ticker: TickerSettings,
    /// Store settings.
    pub database: DatabaseSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Alert settings.
    pub notifications: NotificationSettings,
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `KITE_API_KEY` is missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if `KITE_API_KEY` is missing or empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("KITE_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("KITE_API_KEY".to_string()))?;
        if api_key.trim().is_empty() {
            return Err(ConfigError::EmptyValue("KITE_API_KEY".to_string()));
        }

        let env = EnvSource(&lookup);
        let ticker_defaults = TickerSettings::default();
        let database_defaults = DatabaseSettings::default();

        let ticker = TickerSettings {
            ws_url: env.string("TICKER_WS_URL", ticker_defaults.ws_url),
            reconnect_delay: env.duration_secs(
                "TICKER_RECONNECT_DELAY_SECS",
                ticker_defaults.reconnect_delay,
            ),
            connect_max_attempts: env.parse(
                "TICKER_CONNECT_MAX_ATTEMPTS",
                ticker_defaults.connect_max_attempts,
            ),
            connect_delay_initial: env.duration_millis(
                "TICKER_CONNECT_DELAY_INITIAL_MS",
                ticker_defaults.connect_delay_initial,
            ),
            connect_delay_max: env.duration_secs(
                "TICKER_CONNECT_DELAY_MAX_SECS",
                ticker_defaults.connect_delay_max,
            ),
            connect_delay_multiplier: env.parse(
                "TICKER_CONNECT_DELAY_MULTIPLIER",
                ticker_defaults.connect_delay_multiplier,
            ),
            event_channel_capacity: env.parse(
                "TICKER_EVENT_CHANNEL_CAPACITY",
                ticker_defaults.event_channel_capacity,
            ),
        };

        let database = DatabaseSettings {
            url: env.string("DATABASE_URL", database_defaults.url),
            max_connections: env.parse(
                "DATABASE_MAX_CONNECTIONS",
                database_defaults.max_connections,
            ),
        };

        let server = ServerSettings {
            http_port: env.parse("TICKER_HTTP_PORT", ServerSettings::default().http_port),
        };

        let notifications = NotificationSettings {
            slack_webhook_url: lookup("SLACK_WEBHOOK_URL").filter(|v| !v.trim().is_empty()),
        };

        Ok(Self {
            api_key: ApiKey::new(api_key),
            ticker,
            database,
            server,
            notifications,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

/// Typed reads over a variable lookup. Unparseable values fall back to the
/// default.
struct EnvSource<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> EnvSource<'_, F> {
    fn string(&self, key: &str, default: String) -> String {
        (self.0)(key).filter(|v| !v.is_empty()).unwrap_or(default)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
