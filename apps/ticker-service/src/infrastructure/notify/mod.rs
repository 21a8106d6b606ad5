//! Slack Notifications
//!
//! Posts operator alerts to a Slack incoming webhook. Delivery is
//! fire-and-forget: the caller never waits on Slack and failures only show
//! up in the log.

use std::time::Duration;

use serde_json::json;

use crate::application::ports::Notifier;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Notifier backed by a Slack incoming webhook.
#[derive(Clone)]
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl std::fmt::Debug for SlackNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackNotifier")
            .field("webhook_url", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl SlackNotifier {
    /// Create a notifier for a webhook URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }

    /// Post a message and wait for Slack's answer.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn send(&self, message: &str) -> Result<(), reqwest::Error> {
        self.client
            .post(&self.webhook_url)
            .json(&json!({ "text": message }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl Notifier for SlackNotifier {
    fn notify(&self, message: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(alert = message, "No runtime for Slack notification, dropping it");
            return;
        };

        let notifier = self.clone();
        let message = message.to_string();
        runtime.spawn(async move {
            match notifier.send(&message).await {
                Ok(()) => tracing::debug!("Slack notification delivered"),
                Err(e) => tracing::warn!(error = %e, "Failed to send Slack notification"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use axum::Json;
    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use serde_json::Value;
    use tokio::sync::mpsc;

    use super::*;

    async fn webhook_server(status: StatusCode) -> (String, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel(4);
        let app = Router::new()
            .route(
                "/hook",
                post(
                    move |State(tx): State<mpsc::Sender<Value>>, Json(body): Json<Value>| async move {
                        let _ = tx.send(body).await;
                        status
                    },
                ),
            )
            .with_state(tx);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}/hook"), rx)
    }

    #[tokio::test]
    async fn notify_posts_text_payload() {
        let (url, mut rx) = webhook_server(StatusCode::OK).await;
        let notifier = SlackNotifier::new(url).unwrap();

        notifier.notify("ticker down");

        let body = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body, json!({"text": "ticker down"}));
    }

    #[tokio::test]
    async fn send_reports_rejections() {
        let (url, _rx) = webhook_server(StatusCode::FORBIDDEN).await;
        let notifier = SlackNotifier::new(url).unwrap();
        assert!(notifier.send("hello").await.is_err());
    }

    #[test]
    fn debug_hides_webhook() {
        let notifier = SlackNotifier::new("https://hooks.slack.com/services/secret").unwrap();
        assert!(!format!("{notifier:?}").contains("secret"));
    }
}
