use async_trait::async_trait;
use focusguard_core::{Badge, Notification, Notifier};

/// Prints notifications to stdout.
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, notification: Notification) {
        println!("{}: {}", notification.title, notification.message);
    }

    async fn set_badge(&self, badge: Badge) {
        tracing::debug!(text = %badge.text, color = %badge.color, "Badge");
    }
}
