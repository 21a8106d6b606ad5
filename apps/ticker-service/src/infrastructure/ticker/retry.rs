//! Connect Retry Policy
//!
//! Exponential backoff with jitter for the transport's own connect attempts.
//! Once the attempt budget is spent the transport reports that it will not
//! reconnect and the session manager decides what happens next.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::TickerSettings;

/// Connect retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectRetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Growth factor applied after each retry.
    pub multiplier: f64,
    /// Fraction of the delay randomised in both directions.
    pub jitter_factor: f64,
    /// Retries allowed after the first failed attempt (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ConnectRetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 10,
        }
    }
}

impl ConnectRetryConfig {
    /// Build from ticker settings.
    #[must_use]
    pub fn from_settings(settings: &TickerSettings) -> Self {
        Self {
            initial_delay: settings.connect_delay_initial,
            max_delay: settings.connect_delay_max,
            multiplier: settings.connect_delay_multiplier,
            ..Self::default()
        }
        .with_max_attempts(settings.connect_max_attempts)
    }

    /// Override the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Disable jitter, for deterministic delays.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }
}

/// Stateful retry schedule for one connection run.
#[derive(Debug)]
pub struct ConnectRetry {
    config: ConnectRetryConfig,
    next_base: Duration,
    attempts: u32,
}

impl ConnectRetry {
    /// Start a fresh schedule.
    #[must_use]
    pub const fn new(config: ConnectRetryConfig) -> Self {
        let next_base = config.initial_delay;
        Self {
            config,
            next_base,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts > 0 && self.attempts >= self.config.max_attempts {
            return None;
        }
        self.attempts += 1;

        let delay = jittered(self.next_base, self.config.jitter_factor);
        let multiplier = if self.config.multiplier.is_finite() {
            self.config.multiplier.clamp(1.0, 16.0)
        } else {
            1.0
        };
        self.next_base = self
            .next_base
            .mul_f64(multiplier)
            .min(self.config.max_delay);

        Some(delay.min(self.config.max_delay))
    }

    /// Retries handed out so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Restart the schedule after a successful connect.
    pub const fn reset(&mut self) {
        self.next_base = self.config.initial_delay;
        self.attempts = 0;
    }
}

fn jittered(base: Duration, factor: f64) -> Duration {
    if factor <= 0.0 || base.is_zero() {
        return base;
    }
    let factor = factor.min(1.0);
    let scale = rand::rng().random_range((1.0 - factor)..=(1.0 + factor));
    base.mul_f64(scale)
}

// =============================================================================
// Tests
// =============================================================================
