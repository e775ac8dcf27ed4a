use crate::domain::events::RealtimeEvent;
use crate::domain::ports::broadcast_gateway::BroadcastGateway;
use crate::domain::ports::notifier::{Notification, Notifier};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// In-app delivery: pushes a `notification` event to every live connection
/// of the recipients.
#[derive(Clone)]
pub struct GatewayNotifier {
    gateway: Arc<dyn BroadcastGateway>,
}

impl GatewayNotifier {
    pub fn new(gateway: Arc<dyn BroadcastGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Notifier for GatewayNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), String> {
        let event = RealtimeEvent::Notification {
            title: notification.title,
            content: notification.content,
            resource_ref: notification.resource_ref,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let delivered = self
            .gateway
            .send_to_agents(&notification.recipient_ids, event)
            .await;
        tracing::debug!(
            "Notification delivered to {} connections of {} recipients",
            delivered,
            notification.recipient_ids.len()
        );
        Ok(())
    }
}

/// Posts notifications as JSON to an external endpoint.
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    http_client: Client,
}

impl WebhookNotifier {
    const RETRY_DELAYS_MS: [u64; 3] = [50, 100, 200];

    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, String> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            url: url.into(),
            http_client,
        })
    }

    async fn attempt(&self, notification: &Notification) -> Result<(), String> {
        let payload = serde_json::json!({
            "recipient_ids": notification.recipient_ids,
            "title": notification.title,
            "content": notification.content,
            "resource_ref": notification.resource_ref,
        });

        let response = self
            .http_client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("Connection timeout: {}", e)
                } else if e.is_connect() {
                    format!("Connection failed: {}", e)
                } else {
                    format!("Network error: {}", e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("HTTP {}", status.as_u16()))
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), String> {
        let mut last_error = String::new();

        for (attempt, delay_ms) in std::iter::once(0)
            .chain(Self::RETRY_DELAYS_MS)
            .enumerate()
        {
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            match self.attempt(&notification).await {
                Ok(()) => {
                    info!("Notification '{}' posted to {}", notification.title, self.url);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Notification post to {} failed (attempt {}): {}",
                        self.url,
                        attempt + 1,
                        e
                    );
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

/// Records notifications for assertions; optionally fails every call.
#[derive(Clone, Default)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    fail: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), String> {
        self.sent.lock().await.push(notification);
        if self.fail {
            Err("notifier unavailable".to_string())
        } else {
            Ok(())
        }
    }
}
