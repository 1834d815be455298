//! User-visible notifications (toasts)

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub severity: Severity,
    /// The action the notification is about, e.g. "update priority"
    pub action: String,
    pub message: String,
}

impl Notification {
    pub fn error(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            action: action.into(),
            message: message.into(),
        }
    }

    pub fn info(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            action: action.into(),
            message: message.into(),
        }
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Error => tracing::error!(
                action = %notification.action,
                "{}",
                notification.message
            ),
            Severity::Info => tracing::info!(
                action = %notification.action,
                "{}",
                notification.message
            ),
        }
    }
}

/// Forwards notifications to a UI task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("notification receiver dropped");
        }
    }
}

/// Keeps every notification; for assertions in tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::new();
        sink.notify(Notification::error("update priority", "rejected"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.action, "update priority");
        assert_eq!(received.severity, Severity::Error);
    }

    #[test]
    fn test_recording_sink_is_shared_between_clones() {
        let sink = RecordingSink::new();
        let clone = sink.clone();
        clone.notify(Notification::info("refresh", "done"));
        assert_eq!(sink.notifications().len(), 1);
    }
}
