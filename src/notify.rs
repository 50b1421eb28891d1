//! User notification channel
//!
//! Managers report every user-visible outcome here instead of returning
//! errors to the caller. The receiving side decides how to display them.

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

/// Cloneable sending half of the notification channel
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    /// Create a notifier and the receiver that displays its messages
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn notify_success(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(message = %message, "notify success");
        self.send(NotificationKind::Success, message);
    }

    pub fn notify_error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(message = %message, "notify error");
        self.send(NotificationKind::Error, message);
    }

    fn send(&self, kind: NotificationKind, message: String) {
        // Nobody listening is not an error for the sender
        let _ = self.tx.send(Notification { kind, message });
    }
}
