mod backgroundless;
mod delivery;
mod in_process_scheduler;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::alarm::{AlarmId, RepeatDay};

pub use backgroundless::BackgroundlessNotificationScheduler;
pub use delivery::{LogDeliveryChannel, NotificationDeliveryChannel};
pub use in_process_scheduler::{InProcessNotificationScheduler, InProcessSchedulerOptions};

/// What the platform's notification primitive can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// `false` on targets such as a browser, where nothing fires while the app is closed.
    pub background_scheduling: bool,
    /// Native "fire weekly on weekday X at HH:MM" triggers.
    pub weekly_recurrence: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationPayload {
    Alarm { alarm_id: AlarmId, weekday: RepeatDay },
    Test,
}

impl NotificationPayload {
    pub fn alarm_id(&self) -> Option<&AlarmId> {
        match self {
            NotificationPayload::Alarm { alarm_id, .. } => Some(alarm_id),
            NotificationPayload::Test => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub payload: NotificationPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTrigger {
    Weekly {
        weekday: RepeatDay,
        hour: u32,
        minute: u32,
    },
    /// Local, timezone-naive date and time.
    At(NaiveDateTime),
    Immediate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledNotification {
    pub identifier: String,
    pub trigger: NotificationTrigger,
    pub content: NotificationContent,
}

/// Platform notification scheduler.
///
/// `identifier` arguments are the identifiers the caller asks for; the
/// returned string is the identifier the platform actually assigned and is
/// the one to pass to [`NotificationScheduler::cancel`].
#[async_trait]
pub trait NotificationScheduler: Send + Sync + 'static {
    fn capabilities(&self) -> PlatformCapabilities;

    async fn request_permission(&self) -> anyhow::Result<bool>;

    async fn schedule_recurring_weekly(
        &self,
        identifier: &str,
        weekday: RepeatDay,
        hour: u32,
        minute: u32,
        content: NotificationContent,
    ) -> anyhow::Result<String>;

    async fn schedule_at_absolute_time(
        &self,
        identifier: &str,
        at: NaiveDateTime,
        content: NotificationContent,
    ) -> anyhow::Result<String>;

    async fn present_now(&self, content: NotificationContent) -> anyhow::Result<String>;

    async fn cancel(&self, identifier: &str) -> anyhow::Result<()>;

    async fn list_all_scheduled(&self) -> anyhow::Result<Vec<ScheduledNotification>>;
}
