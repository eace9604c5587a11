use std::{collections::BTreeSet, sync::Arc};

use chrono::{Datelike, NaiveDateTime};

use crate::{
    alarm::{Alarm, AlarmId, RepeatDay},
    error::{AlarmError, SchedulingError, TriggerFailure},
    notification::{
        NotificationContent, NotificationPayload, NotificationScheduler, NotificationTrigger,
        ScheduledNotification,
    },
    occurrence::upcoming_occurrences,
    storage::AlarmStore,
};

use super::Clock;

/// Prefix of every notification identifier the engine requests.
pub const ALARM_NOTIFICATION_PREFIX: &str = "checkin_alarm";

const DEFAULT_LOOKAHEAD_WEEKS: u32 = 4;

const TEST_TITLE: &str = "🔔 Test alarm";
const TEST_BODY: &str = "Alarms are working!";

#[derive(Debug, Clone)]
pub struct SchedulingOptions {
    pub title: String,
    pub body: String,
    /// Weeks of one-shot notifications created per weekday when the platform
    /// has no weekly recurrence.
    pub lookahead_weeks: u32,
}

impl Default for SchedulingOptions {
    fn default() -> Self {
        Self {
            title: "📋 Time for your daily check-in!".to_owned(),
            body: "Please complete today's check-in.".to_owned(),
            lookahead_weeks: DEFAULT_LOOKAHEAD_WEEKS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled { identifiers: Vec<String> },
    /// The platform cannot fire notifications in the background. Only the
    /// alarm definition is kept.
    Unsupported,
    /// The alarm is disabled and has no live notifications.
    Disabled,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CancelReport {
    pub cancelled: Vec<String>,
    pub failed: usize,
}

/// Turns alarms into platform notifications and tears them down again.
pub struct AlarmScheduler {
    store: Arc<AlarmStore>,
    notifications: Arc<dyn NotificationScheduler>,
    clock: Arc<dyn Clock>,
    options: SchedulingOptions,
}

impl AlarmScheduler {
    pub fn new(
        store: Arc<AlarmStore>,
        notifications: Arc<dyn NotificationScheduler>,
        clock: Arc<dyn Clock>,
        options: SchedulingOptions,
    ) -> Self {
        Self {
            store,
            notifications,
            clock,
            options,
        }
    }

    /// Replaces every live notification of `alarm` with a freshly derived set.
    ///
    /// Previous notifications are always cancelled first, so calling this
    /// repeatedly never leaves duplicates. On partial failure the identifiers
    /// that were scheduled are still persisted before the aggregated
    /// [`SchedulingError`] is returned.
    pub async fn schedule_single_alarm(
        &self,
        alarm: &Alarm,
    ) -> Result<ScheduleOutcome, AlarmError> {
        self.cancel_single_alarm(&alarm.id).await?;

        let capabilities = self.notifications.capabilities();
        if !capabilities.background_scheduling {
            log::info!(
                "Background notifications are unavailable, keeping alarm settings only. [alarm_id = {}]",
                alarm.id
            );
            return Ok(ScheduleOutcome::Unsupported);
        }

        let granted = self
            .notifications
            .request_permission()
            .await
            .map_err(AlarmError::Notification)?;
        if !granted {
            log::warn!(
                "Notification permission denied. [alarm_id = {}]",
                alarm.id
            );
            return Err(AlarmError::PermissionDenied);
        }

        let mut identifiers = vec![];
        let mut failures = vec![];

        for weekday in alarm.effective_days() {
            let content = self.alarm_content(alarm, weekday);

            if capabilities.weekly_recurrence {
                let result = self
                    .notifications
                    .schedule_recurring_weekly(
                        &weekly_identifier(&alarm.id, weekday),
                        weekday,
                        alarm.time.hour(),
                        alarm.time.minute(),
                        content,
                    )
                    .await;

                match result {
                    Ok(identifier) => identifiers.push(identifier),
                    Err(error) => failures.push(TriggerFailure {
                        weekday,
                        occurrence: None,
                        error,
                    }),
                }
            } else {
                let occurrences = upcoming_occurrences(
                    weekday,
                    alarm.time.time(),
                    self.clock.now(),
                    self.lookahead_weeks(),
                );

                for occurrence in occurrences {
                    let result = self
                        .notifications
                        .schedule_at_absolute_time(
                            &occurrence_identifier(&alarm.id, weekday, occurrence),
                            occurrence,
                            content.clone(),
                        )
                        .await;

                    match result {
                        Ok(identifier) => identifiers.push(identifier),
                        Err(error) => failures.push(TriggerFailure {
                            weekday,
                            occurrence: Some(occurrence),
                            error,
                        }),
                    }
                }
            }
        }

        self.store.set_scheduled_ids(&alarm.id, &identifiers).await?;

        if !failures.is_empty() {
            let error = SchedulingError {
                alarm_id: alarm.id.clone(),
                failures,
                scheduled: identifiers,
            };
            log::error!("{error}");
            return Err(error.into());
        }

        log::info!(
            "Scheduled alarm. [alarm_id = {}, time = {}, notifications = {}]",
            alarm.id,
            alarm.time,
            identifiers.len()
        );

        Ok(ScheduleOutcome::Scheduled { identifiers })
    }

    /// Best-effort removal of every live notification belonging to the alarm.
    ///
    /// Individual cancellation failures are logged and counted; the persisted
    /// identifier set is cleared regardless.
    pub async fn cancel_single_alarm(&self, alarm_id: &AlarmId) -> Result<CancelReport, AlarmError> {
        let stored_ids = self.store.scheduled_ids(alarm_id).await?;
        let mut report = CancelReport::default();

        for identifier in stored_ids {
            self.cancel_notification(alarm_id, identifier, &mut report)
                .await;
        }

        // Anything still live under this alarm's name was left behind by an
        // earlier run whose identifier set never got persisted.
        match self.notifications.list_all_scheduled().await {
            Ok(live) => {
                for notification in live {
                    if belongs_to(&notification, alarm_id) {
                        self.cancel_notification(alarm_id, notification.identifier, &mut report)
                            .await;
                    }
                }
            }
            Err(error) => log::warn!(
                "Unable to list scheduled notifications. [alarm_id = {}, error = {:#}]",
                alarm_id,
                error
            ),
        }

        self.store.clear_scheduled_ids(alarm_id).await?;

        if !report.cancelled.is_empty() || report.failed > 0 {
            log::info!(
                "Cancelled alarm notifications. [alarm_id = {}, cancelled = {}, failed = {}]",
                alarm_id,
                report.cancelled.len(),
                report.failed
            );
        }

        Ok(report)
    }

    async fn cancel_notification(
        &self,
        alarm_id: &AlarmId,
        identifier: String,
        report: &mut CancelReport,
    ) {
        match self.notifications.cancel(&identifier).await {
            Ok(()) => report.cancelled.push(identifier),
            Err(error) => {
                log::warn!(
                    "Unable to cancel notification. [alarm_id = {}, identifier = {}, error = {:#}]",
                    alarm_id,
                    identifier,
                    error
                );
                report.failed += 1;
            }
        }
    }

    pub async fn scheduled_notifications(
        &self,
        alarm_id: &AlarmId,
    ) -> Result<Vec<ScheduledNotification>, AlarmError> {
        let live = self
            .notifications
            .list_all_scheduled()
            .await
            .map_err(AlarmError::Notification)?;

        Ok(live
            .into_iter()
            .filter(|notification| belongs_to(notification, alarm_id))
            .collect())
    }

    /// Ids of every alarm that currently has a live notification.
    pub async fn live_alarm_ids(&self) -> Result<BTreeSet<AlarmId>, AlarmError> {
        let live = self
            .notifications
            .list_all_scheduled()
            .await
            .map_err(AlarmError::Notification)?;

        Ok(live
            .into_iter()
            .filter_map(|notification| notification.content.payload.alarm_id().cloned())
            .collect())
    }

    pub async fn is_alarm_scheduled(&self, alarm_id: &AlarmId) -> Result<bool, AlarmError> {
        Ok(!self.scheduled_notifications(alarm_id).await?.is_empty())
    }

    /// Whether the live notifications no longer match the alarm.
    ///
    /// With one-shot fallback triggers this also reports an alarm whose
    /// lookahead window is more than half used up, so it gets renewed.
    pub async fn needs_reschedule(&self, alarm: &Alarm) -> Result<bool, AlarmError> {
        let capabilities = self.notifications.capabilities();
        if !capabilities.background_scheduling {
            return Ok(false);
        }

        let live = self.scheduled_notifications(&alarm.id).await?;
        if !alarm.enabled {
            return Ok(!live.is_empty());
        }

        let now = self.clock.now();
        let days = alarm.effective_days();

        let stale = live.iter().any(|notification| !fires_for(notification, alarm, &days));
        if stale {
            return Ok(true);
        }

        for weekday in days {
            let has_weekly = live.iter().any(|notification| {
                matches!(notification.trigger, NotificationTrigger::Weekly { weekday: day, .. } if day == weekday)
            });
            if has_weekly {
                continue;
            }
            if capabilities.weekly_recurrence {
                return Ok(true);
            }

            let remaining = live
                .iter()
                .filter(|notification| {
                    matches!(notification.trigger, NotificationTrigger::At(at) if at > now && RepeatDay::from(at.weekday()) == weekday)
                })
                .count();
            if remaining * 2 < self.lookahead_weeks() as usize {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Fires a notification right away so the user can check alarms work.
    pub async fn send_test_notification(&self) -> Result<String, AlarmError> {
        if !self.notifications.capabilities().background_scheduling {
            return Err(AlarmError::Unsupported("test notification"));
        }

        let granted = self
            .notifications
            .request_permission()
            .await
            .map_err(AlarmError::Notification)?;
        if !granted {
            return Err(AlarmError::PermissionDenied);
        }

        let content = NotificationContent {
            title: TEST_TITLE.to_owned(),
            body: TEST_BODY.to_owned(),
            payload: NotificationPayload::Test,
        };

        let identifier = self
            .notifications
            .present_now(content)
            .await
            .map_err(AlarmError::Notification)?;
        log::info!("Sent test notification {identifier}");

        Ok(identifier)
    }

    fn alarm_content(&self, alarm: &Alarm, weekday: RepeatDay) -> NotificationContent {
        NotificationContent {
            title: self.options.title.clone(),
            body: self.options.body.clone(),
            payload: NotificationPayload::Alarm {
                alarm_id: alarm.id.clone(),
                weekday,
            },
        }
    }

    fn lookahead_weeks(&self) -> u32 {
        self.options.lookahead_weeks.max(1)
    }
}

fn identifier_prefix(alarm_id: &AlarmId) -> String {
    format!("{ALARM_NOTIFICATION_PREFIX}:{alarm_id}:")
}

fn weekly_identifier(alarm_id: &AlarmId, weekday: RepeatDay) -> String {
    format!("{}{weekday}", identifier_prefix(alarm_id))
}

fn occurrence_identifier(alarm_id: &AlarmId, weekday: RepeatDay, occurrence: NaiveDateTime) -> String {
    format!(
        "{}{weekday}:{}",
        identifier_prefix(alarm_id),
        occurrence.format("%Y%m%d")
    )
}

fn belongs_to(notification: &ScheduledNotification, alarm_id: &AlarmId) -> bool {
    notification.content.payload.alarm_id() == Some(alarm_id)
        || identifier_names(&notification.identifier, alarm_id)
}

/// Whether `identifier` is exactly `<prefix>:<id>:<weekday>` or
/// `<prefix>:<id>:<weekday>:<YYYYMMDD>`. Ids may contain `:`, so a bare
/// prefix match would also claim alarm `a:b` for alarm `a`.
fn identifier_names(identifier: &str, alarm_id: &AlarmId) -> bool {
    let Some(rest) = identifier.strip_prefix(&identifier_prefix(alarm_id)) else {
        return false;
    };

    let (weekday, date) = match rest.split_once(':') {
        Some((weekday, date)) => (weekday, Some(date)),
        None => (rest, None),
    };

    weekday.parse::<RepeatDay>().is_ok()
        && date.is_none_or(|date| date.len() == 8 && date.bytes().all(|b| b.is_ascii_digit()))
}

fn fires_for(notification: &ScheduledNotification, alarm: &Alarm, days: &[RepeatDay]) -> bool {
    match notification.trigger {
        NotificationTrigger::Weekly {
            weekday,
            hour,
            minute,
        } => days.contains(&weekday) && hour == alarm.time.hour() && minute == alarm.time.minute(),
        NotificationTrigger::At(at) => {
            days.contains(&RepeatDay::from(at.weekday())) && at.time() == alarm.time.time()
        }
        NotificationTrigger::Immediate => false,
    }
}
