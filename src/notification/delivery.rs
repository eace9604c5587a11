use async_trait::async_trait;

use super::ScheduledNotification;

/// Where fired notifications end up.
#[async_trait]
pub trait NotificationDeliveryChannel: Send + Sync + 'static {
    async fn deliver(&self, notification: &ScheduledNotification);
}

pub struct LogDeliveryChannel;

#[async_trait]
impl NotificationDeliveryChannel for LogDeliveryChannel {
    async fn deliver(&self, notification: &ScheduledNotification) {
        log::info!(
            "🔔 {}: {} [identifier = {}]",
            notification.content.title,
            notification.content.body,
            notification.identifier
        );
    }
}
