//! Notifier Port (Driven Port)
//!
//! Fire-and-forget operator alerts.

/// Port for sending operator alerts.
pub trait Notifier: Send + Sync {
    /// Send an alert. Must not block; delivery failures are the adapter's
    /// concern.
    fn notify(&self, message: &str);
}

/// Notifier that drops every alert.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNotifier;

impl Notifier for NoOpNotifier {
    fn notify(&self, _message: &str) {}
}
