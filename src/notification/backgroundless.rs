use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::alarm::RepeatDay;

use super::{NotificationContent, NotificationScheduler, PlatformCapabilities, ScheduledNotification};

/// A target that cannot fire anything in the background, e.g. a browser.
///
/// Alarm definitions are still kept; nothing is ever scheduled.
pub struct BackgroundlessNotificationScheduler;

#[async_trait]
impl NotificationScheduler for BackgroundlessNotificationScheduler {
    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities {
            background_scheduling: false,
            weekly_recurrence: false,
        }
    }

    async fn request_permission(&self) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn schedule_recurring_weekly(
        &self,
        _identifier: &str,
        _weekday: RepeatDay,
        _hour: u32,
        _minute: u32,
        _content: NotificationContent,
    ) -> anyhow::Result<String> {
        anyhow::bail!("Background notifications are not available")
    }

    async fn schedule_at_absolute_time(
        &self,
        _identifier: &str,
        _at: NaiveDateTime,
        _content: NotificationContent,
    ) -> anyhow::Result<String> {
        anyhow::bail!("Background notifications are not available")
    }

    async fn present_now(&self, _content: NotificationContent) -> anyhow::Result<String> {
        anyhow::bail!("Background notifications are not available")
    }

    async fn cancel(&self, _identifier: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn list_all_scheduled(&self) -> anyhow::Result<Vec<ScheduledNotification>> {
        Ok(vec![])
    }
}
