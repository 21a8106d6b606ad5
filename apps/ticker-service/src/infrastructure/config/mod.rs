//! Configuration Module
//!
//! Environment-driven configuration for the ticker service.

mod settings;

pub use settings::{
    ApiKey, ConfigError, DatabaseSettings, NotificationSettings, ServerSettings, ServiceConfig,
    TickerSettings,
};
