use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::{
    sync::{RwLock, watch},
    task::{self, JoinHandle},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{alarm::RepeatDay, occurrence::next_occurrence};

use super::{
    NotificationContent, NotificationDeliveryChannel, NotificationScheduler, NotificationTrigger,
    PlatformCapabilities, ScheduledNotification,
};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy)]
pub struct InProcessSchedulerOptions {
    /// When off, weekly triggers are refused and callers have to fall back to one-shot dates.
    pub weekly_recurrence: bool,
    pub permission_granted: bool,
}

impl Default for InProcessSchedulerOptions {
    fn default() -> Self {
        Self {
            weekly_recurrence: true,
            permission_granted: true,
        }
    }
}

struct LiveNotification {
    notification: ScheduledNotification,
    cancellation_token: CancellationToken,
    task: JoinHandle<()>,
}

struct CleanupTask(watch::Sender<()>);

type LiveNotificationStore = RwLock<HashMap<String, LiveNotification>>;

/// Fires notifications from tokio tasks inside the running process.
///
/// Each scheduled notification owns one task that sleeps until its next
/// fire time in the configured timezone. Weekly notifications re-arm after
/// firing, one-shot ones finish and are swept by a periodic cleanup task.
pub struct InProcessNotificationScheduler {
    notifications: Arc<LiveNotificationStore>,
    delivery_channel: Arc<dyn NotificationDeliveryChannel>,
    timezone: Tz,
    options: InProcessSchedulerOptions,
    cleanup_task: CleanupTask,
    /// Parent of every notification's token; cancelled on drop.
    root_token: CancellationToken,
}

impl InProcessNotificationScheduler {
    pub fn new(
        delivery_channel: Arc<dyn NotificationDeliveryChannel>,
        timezone: Tz,
        options: InProcessSchedulerOptions,
    ) -> Self {
        let notifications = Arc::new(RwLock::new(HashMap::new()));
        let cleanup_task = Self::spawn_cleanup_task(Arc::clone(&notifications));

        Self {
            notifications,
            delivery_channel,
            timezone,
            options,
            cleanup_task,
            root_token: CancellationToken::new(),
        }
    }

    async fn start(&self, notification: ScheduledNotification) -> String {
        let identifier = notification.identifier.clone();
        let cancellation_token = self.root_token.child_token();

        let task_token = cancellation_token.child_token();
        let task_notification = notification.clone();
        let delivery_channel = Arc::clone(&self.delivery_channel);
        let timezone = self.timezone;
        let task = task::spawn(async move {
            run_notification(task_notification, timezone, delivery_channel, task_token).await;
        });

        let live = LiveNotification {
            notification,
            cancellation_token,
            task,
        };

        if let Some(previous) = self
            .notifications
            .write()
            .await
            .insert(identifier.clone(), live)
        {
            previous.cancellation_token.cancel();
            log::info!("Replaced scheduled notification {identifier}");
        }

        identifier
    }

    fn spawn_cleanup_task(notifications: Arc<LiveNotificationStore>) -> CleanupTask {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(());
        task::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(CLEANUP_INTERVAL) => {
                        Self::clean_finished_notifications(&notifications).await;
                    }
                    _ = shutdown_rx.changed() => {
                        log::info!("Notification cleanup task shutting down");
                        break;
                    }
                };
            }
        });

        CleanupTask(shutdown_tx)
    }

    async fn clean_finished_notifications(notifications: &LiveNotificationStore) {
        let mut notifications = notifications.write().await;
        let before = notifications.len();
        notifications.retain(|_, live| !live.task.is_finished());
        let after = notifications.len();

        if before != after {
            log::info!("Cleaned up {} delivered notifications", before - after);
        }
    }
}

impl Drop for InProcessNotificationScheduler {
    fn drop(&mut self) {
        let _ = self.cleanup_task.0.send(());
        self.root_token.cancel();
    }
}

#[async_trait]
impl NotificationScheduler for InProcessNotificationScheduler {
    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities {
            background_scheduling: true,
            weekly_recurrence: self.options.weekly_recurrence,
        }
    }

    async fn request_permission(&self) -> anyhow::Result<bool> {
        if !self.options.permission_granted {
            log::warn!("Notification permission is not granted");
        }
        Ok(self.options.permission_granted)
    }

    async fn schedule_recurring_weekly(
        &self,
        identifier: &str,
        weekday: RepeatDay,
        hour: u32,
        minute: u32,
        content: NotificationContent,
    ) -> anyhow::Result<String> {
        anyhow::ensure!(
            self.options.weekly_recurrence,
            "Weekly recurring notifications are not supported"
        );
        anyhow::ensure!(
            NaiveTime::from_hms_opt(hour, minute, 0).is_some(),
            "Invalid trigger time {hour}:{minute}"
        );

        let notification = ScheduledNotification {
            identifier: identifier.to_owned(),
            trigger: NotificationTrigger::Weekly {
                weekday,
                hour,
                minute,
            },
            content,
        };

        Ok(self.start(notification).await)
    }

    async fn schedule_at_absolute_time(
        &self,
        identifier: &str,
        at: NaiveDateTime,
        content: NotificationContent,
    ) -> anyhow::Result<String> {
        let fire_at = resolve_local(self.timezone, at)
            .ok_or_else(|| anyhow::anyhow!("{at} does not exist in {}", self.timezone))?;
        anyhow::ensure!(fire_at > Utc::now(), "Trigger date {at} is in the past");

        let notification = ScheduledNotification {
            identifier: identifier.to_owned(),
            trigger: NotificationTrigger::At(at),
            content,
        };

        Ok(self.start(notification).await)
    }

    async fn present_now(&self, content: NotificationContent) -> anyhow::Result<String> {
        let notification = ScheduledNotification {
            identifier: format!("immediate:{}", uuid::Uuid::new_v4()),
            trigger: NotificationTrigger::Immediate,
            content,
        };

        Ok(self.start(notification).await)
    }

    async fn cancel(&self, identifier: &str) -> anyhow::Result<()> {
        match self.notifications.write().await.remove(identifier) {
            Some(live) => {
                live.cancellation_token.cancel();
                Ok(())
            }
            None => anyhow::bail!("No scheduled notification {identifier}"),
        }
    }

    async fn list_all_scheduled(&self) -> anyhow::Result<Vec<ScheduledNotification>> {
        let notifications = self.notifications.read().await;
        let mut scheduled: Vec<_> = notifications
            .values()
            .filter(|live| !live.task.is_finished())
            .map(|live| live.notification.clone())
            .collect();
        scheduled.sort_by(|a, b| a.identifier.cmp(&b.identifier));

        Ok(scheduled)
    }
}

async fn run_notification(
    notification: ScheduledNotification,
    timezone: Tz,
    delivery: Arc<dyn NotificationDeliveryChannel>,
    cancellation_token: CancellationToken,
) {
    // Wall-clock fire times are mapped onto tokio's monotonic clock once, at start.
    let started_at = Instant::now();
    let started_wall = Utc::now();

    let mut after = started_wall;
    while let Some(fire_at) = next_fire_time(&notification.trigger, timezone, after) {
        let offset = (fire_at - started_wall).to_std().unwrap_or(Duration::ZERO);
        log::info!(
            "[SCHEDULE] Sleeping until {} ({:?} after start). Notification {}",
            fire_at,
            offset,
            notification.identifier
        );

        tokio::select! {
            _ = cancellation_token.cancelled() => {
                log::info!("[CANCEL] Notification {} was cancelled", notification.identifier);
                return;
            }
            _ = tokio::time::sleep_until(started_at + offset) => {
                delivery.deliver(&notification).await;
            }
        }

        if !matches!(notification.trigger, NotificationTrigger::Weekly { .. }) {
            return;
        }
        after = fire_at;
    }

    log::warn!(
        "Notification {} has no upcoming fire time",
        notification.identifier
    );
}

/// Next instant strictly after `after` at which the trigger fires.
pub(crate) fn next_fire_time(
    trigger: &NotificationTrigger,
    timezone: Tz,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match *trigger {
        NotificationTrigger::Weekly {
            weekday,
            hour,
            minute,
        } => {
            let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
            let mut local_after = after.with_timezone(&timezone).naive_local();
            // A DST fold can map the next local occurrence to an instant that is not after `after`.
            for _ in 0..2 {
                let occurrence = next_occurrence(weekday, time, local_after)?;
                if let Some(fire_at) = resolve_local(timezone, occurrence) {
                    if fire_at > after {
                        return Some(fire_at);
                    }
                }
                local_after = occurrence;
            }
            None
        }
        NotificationTrigger::At(at) => resolve_local(timezone, at),
        NotificationTrigger::Immediate => Some(after),
    }
}

/// Maps a local wall-clock time to an instant. Ambiguous times take the
/// earlier instant, times skipped by a DST gap move forward by an hour.
pub(crate) fn resolve_local(timezone: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    timezone
        .from_local_datetime(&local)
        .earliest()
        .or_else(|| {
            let shifted = local.checked_add_signed(TimeDelta::hours(1))?;
            timezone.from_local_datetime(&shifted).earliest()
        })
        .map(|fire_at| fire_at.with_timezone(&Utc))
}
