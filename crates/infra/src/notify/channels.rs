use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use super::{Notification, Notifier, NotifyError};

/// Writes each notification as a structured log line.
///
/// Stand-in for the external email backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let attachments: Vec<String> = notification
            .attachments
            .iter()
            .map(|a| format!("{} ({} bytes)", a.filename, a.content.len()))
            .collect();

        info!(
            recipients = ?notification.recipients,
            subject = %notification.subject,
            attachments = ?attachments,
            body = %notification.body,
            "reconciliation notification"
        );
        Ok(())
    }
}

/// Records deliveries (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Delivery("lock poisoned".to_string()))?
            .push(notification.clone());
        Ok(())
    }
}
