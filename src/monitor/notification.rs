use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::MonitorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotificationKind {
    /// A pushed reading was itself flagged as an alert.
    ReadingAlert,
    /// A shipment started alerting after a temperature update.
    ShipmentAlert,
    /// A backend call failed; shown once and dropped.
    Error,
    Info,
}

/// A one-shot, user-visible message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub description: String,
    pub shipment_id: Option<Uuid>,
}

impl Notification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            description: description.into(),
            shipment_id: None,
        }
    }

    pub fn for_shipment(mut self, shipment_id: Uuid) -> Self {
        self.shipment_id = Some(shipment_id);
        self
    }

    pub fn failure(title: impl Into<String>, err: &MonitorError) -> Self {
        Self::new(NotificationKind::Error, title, err.to_string())
    }

    pub fn is_alert(&self) -> bool {
        matches!(self.kind, NotificationKind::ReadingAlert | NotificationKind::ShipmentAlert)
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.description)
    }
}

/// Sending half of the notification channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    pub fn new(tx: mpsc::Sender<Notification>) -> Self {
        Self { tx }
    }

    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    pub async fn notify(&self, notification: Notification) {
        if self.tx.send(notification).await.is_err() {
            debug!("Notification dropped, no receiver");
        }
    }

    /// Logs a failed backend call and surfaces it once.
    pub async fn report_failure(&self, title: &str, err: &MonitorError) {
        error!("{}: {}", title, err);
        self.notify(Notification::failure(title, err)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failure_is_surfaced_once() {
        let (notifier, mut rx) = Notifier::channel(4);
        let err = MonitorError::Validation("Temperature must be below 100°C".to_string());

        notifier.report_failure("Error adding temperature reading", &err).await;
        drop(notifier);

        let n = rx.recv().await.unwrap();
        assert_eq!(n.kind, NotificationKind::Error);
        assert_eq!(n.title, "Error adding temperature reading");
        assert!(n.description.contains("below 100"));
        assert!(!n.is_alert());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_notify_without_receiver_does_not_fail() {
        let (notifier, rx) = Notifier::channel(1);
        drop(rx);
        notifier
            .notify(Notification::new(NotificationKind::Info, "Shipment created", "SH-a1b2c"))
            .await;
    }
}
