use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient_ids: Vec<String>,
    pub title: String,
    pub content: String,
    pub resource_ref: Option<String>,
}

/// Outbound notification delivery. Retry and backoff belong to the
/// implementation; callers dispatch it in the background and never await it
/// from a sweep.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), String>;
}
