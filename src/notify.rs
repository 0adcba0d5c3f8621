//! Transient user-facing messages emitted when a mutation settles.

use std::fmt;

use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
  Success,
  Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub level: Level,
  pub title: String,
  pub message: String,
}

impl fmt::Display for Notification {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let tag = match self.level {
      Level::Success => "ok",
      Level::Error => "error",
    };
    write!(f, "[{}] {}: {}", tag, self.title, self.message)
  }
}

/// Sending half of the notification channel.
///
/// Cloned into every component that reports outcomes. Sending never blocks
/// and never fails from the caller's point of view; with no receiver left the
/// notification is only logged.
#[derive(Clone, Debug)]
pub struct Notifier {
  tx: Option<mpsc::UnboundedSender<Notification>>,
}

impl Notifier {
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx: Some(tx) }, rx)
  }

  /// A notifier that only logs.
  pub fn disabled() -> Self {
    Self { tx: None }
  }

  pub fn success(&self, title: impl Into<String>, message: impl Into<String>) {
    let notification = Notification {
      level: Level::Success,
      title: title.into(),
      message: message.into(),
    };
    info!(title = %notification.title, "{}", notification.message);
    self.send(notification);
  }

  pub fn error(&self, title: impl Into<String>, message: impl Into<String>) {
    let notification = Notification {
      level: Level::Error,
      title: title.into(),
      message: message.into(),
    };
    warn!(title = %notification.title, "{}", notification.message);
    self.send(notification);
  }

  fn send(&self, notification: Notification) {
    if let Some(tx) = &self.tx {
      let _ = tx.send(notification);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_channel_delivers_in_order() {
    let (notifier, mut rx) = Notifier::channel();
    notifier.success("Order created", "ORD-001 was created");
    notifier.error("Update failed", "network down");

    let first = rx.try_recv().unwrap();
    assert_eq!(first.level, Level::Success);
    assert_eq!(first.title, "Order created");
    let second = rx.try_recv().unwrap();
    assert_eq!(second.level, Level::Error);
    assert_eq!(second.to_string(), "[error] Update failed: network down");
    assert!(rx.try_recv().is_err());
  }

  #[test]
  fn test_send_without_receiver_is_silent() {
    let (notifier, rx) = Notifier::channel();
    drop(rx);
    notifier.error("Delete failed", "gone");
    Notifier::disabled().success("Saved", "ok");
  }
}
