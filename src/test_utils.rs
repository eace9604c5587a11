use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

use crate::{
    alarm::{Alarm, AlarmId, RepeatDay},
    notification::{
        NotificationContent, NotificationScheduler, NotificationTrigger, PlatformCapabilities,
        ScheduledNotification,
    },
    scheduling::{AlarmScheduler, Clock, SchedulingOptions},
    service::AlarmService,
    storage::{AlarmStore, InMemoryKeyValueStore, KeyValueStore},
};

#[derive(Default)]
struct FakeState {
    live: BTreeMap<String, ScheduledNotification>,
    failing_days: HashSet<RepeatDay>,
    failing_cancels: HashSet<String>,
    permission_denied: bool,
    schedule_calls: usize,
    cancel_calls: usize,
}

/// Notification scheduler that keeps everything in memory and can be told to fail.
pub struct FakeNotificationScheduler {
    capabilities: PlatformCapabilities,
    state: Mutex<FakeState>,
}

impl FakeNotificationScheduler {
    pub fn new() -> Self {
        Self::with_capabilities(PlatformCapabilities {
            background_scheduling: true,
            weekly_recurrence: true,
        })
    }

    pub fn without_weekly_recurrence() -> Self {
        Self::with_capabilities(PlatformCapabilities {
            background_scheduling: true,
            weekly_recurrence: false,
        })
    }

    pub fn backgroundless() -> Self {
        Self::with_capabilities(PlatformCapabilities {
            background_scheduling: false,
            weekly_recurrence: false,
        })
    }

    fn with_capabilities(capabilities: PlatformCapabilities) -> Self {
        Self {
            capabilities,
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn deny_permission(&self) {
        self.state.lock().unwrap().permission_denied = true;
    }

    pub fn grant_permission(&self) {
        self.state.lock().unwrap().permission_denied = false;
    }

    pub fn fail_on(&self, day: RepeatDay) {
        self.state.lock().unwrap().failing_days.insert(day);
    }

    pub fn stop_failing(&self) {
        self.state.lock().unwrap().failing_days.clear();
    }

    pub fn fail_cancel(&self, identifier: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_cancels
            .insert(identifier.to_owned());
    }

    /// Puts a notification in place behind the engine's back.
    pub fn inject(&self, notification: ScheduledNotification) {
        self.state
            .lock()
            .unwrap()
            .live
            .insert(notification.identifier.clone(), notification);
    }

    /// Drops a notification without going through `cancel`, as a restarted platform would.
    pub fn forget(&self, identifier: &str) {
        self.state.lock().unwrap().live.remove(identifier);
    }

    pub fn live(&self) -> Vec<ScheduledNotification> {
        self.state.lock().unwrap().live.values().cloned().collect()
    }

    pub fn live_for(&self, alarm_id: &AlarmId) -> Vec<ScheduledNotification> {
        self.live()
            .into_iter()
            .filter(|notification| notification.content.payload.alarm_id() == Some(alarm_id))
            .collect()
    }

    pub fn schedule_calls(&self) -> usize {
        self.state.lock().unwrap().schedule_calls
    }

    pub fn cancel_calls(&self) -> usize {
        self.state.lock().unwrap().cancel_calls
    }

    fn schedule(
        &self,
        identifier: &str,
        weekday: RepeatDay,
        trigger: NotificationTrigger,
        content: NotificationContent,
    ) -> anyhow::Result<String> {
        let mut state = self.state.lock().unwrap();
        state.schedule_calls += 1;
        if state.failing_days.contains(&weekday) {
            anyhow::bail!("Notification quota exceeded");
        }

        state.live.insert(
            identifier.to_owned(),
            ScheduledNotification {
                identifier: identifier.to_owned(),
                trigger,
                content,
            },
        );

        Ok(identifier.to_owned())
    }
}

#[async_trait]
impl NotificationScheduler for FakeNotificationScheduler {
    fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    async fn request_permission(&self) -> anyhow::Result<bool> {
        Ok(!self.state.lock().unwrap().permission_denied)
    }

    async fn schedule_recurring_weekly(
        &self,
        identifier: &str,
        weekday: RepeatDay,
        hour: u32,
        minute: u32,
        content: NotificationContent,
    ) -> anyhow::Result<String> {
        anyhow::ensure!(self.capabilities.weekly_recurrence, "Not supported");
        let trigger = NotificationTrigger::Weekly {
            weekday,
            hour,
            minute,
        };
        self.schedule(identifier, weekday, trigger, content)
    }

    async fn schedule_at_absolute_time(
        &self,
        identifier: &str,
        at: NaiveDateTime,
        content: NotificationContent,
    ) -> anyhow::Result<String> {
        let weekday = RepeatDay::from(at.weekday());
        self.schedule(identifier, weekday, NotificationTrigger::At(at), content)
    }

    async fn present_now(&self, _content: NotificationContent) -> anyhow::Result<String> {
        let mut state = self.state.lock().unwrap();
        state.schedule_calls += 1;
        Ok(format!("immediate:{}", state.schedule_calls))
    }

    async fn cancel(&self, identifier: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.cancel_calls += 1;
        if state.failing_cancels.contains(identifier) {
            anyhow::bail!("Cancellation rejected");
        }

        match state.live.remove(identifier) {
            Some(_) => Ok(()),
            None => anyhow::bail!("No scheduled notification {identifier}"),
        }
    }

    async fn list_all_scheduled(&self) -> anyhow::Result<Vec<ScheduledNotification>> {
        Ok(self.live())
    }
}

/// Clock that only moves when told to.
pub struct ManualClock(Mutex<NaiveDateTime>);

impl ManualClock {
    /// Saturday, 2025-05-31 12:00.
    pub fn new() -> Self {
        Self(Mutex::new(NaiveDateTime::new(
            NaiveDate::from_ymd_opt(2025, 5, 31).unwrap(),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        )))
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.0.lock().unwrap();
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}

/// Store whose every call fails.
pub struct FailingKeyValueStore;

#[async_trait]
impl KeyValueStore for FailingKeyValueStore {
    async fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
        anyhow::bail!("Storage is unavailable")
    }

    async fn set(&self, _key: &str, _value: String) -> anyhow::Result<()> {
        anyhow::bail!("Storage is unavailable")
    }

    async fn remove(&self, _key: &str) -> anyhow::Result<()> {
        anyhow::bail!("Storage is unavailable")
    }
}

pub struct TestContext {
    pub kv: Arc<dyn KeyValueStore>,
    pub store: Arc<AlarmStore>,
    pub notifications: Arc<FakeNotificationScheduler>,
    pub clock: Arc<ManualClock>,
    pub scheduler: Arc<AlarmScheduler>,
    pub service: AlarmService,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_notifications(FakeNotificationScheduler::new())
    }

    pub fn with_notifications(notifications: FakeNotificationScheduler) -> Self {
        Self::build(Arc::new(InMemoryKeyValueStore::new()), notifications)
    }

    pub fn with_store(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::build(kv, FakeNotificationScheduler::new())
    }

    fn build(kv: Arc<dyn KeyValueStore>, notifications: FakeNotificationScheduler) -> Self {
        let store = Arc::new(AlarmStore::new(Arc::clone(&kv)));
        let notifications = Arc::new(notifications);
        let clock = Arc::new(ManualClock::new());
        let scheduler = Arc::new(AlarmScheduler::new(
            Arc::clone(&store),
            notifications.clone(),
            clock.clone(),
            SchedulingOptions::default(),
        ));
        let service = AlarmService::new(Arc::clone(&store), Arc::clone(&scheduler));

        Self {
            kv,
            store,
            notifications,
            clock,
            scheduler,
            service,
        }
    }
}

pub fn alarm(time: &str, days: &[RepeatDay]) -> Alarm {
    Alarm {
        id: AlarmId::generate(),
        time: time.parse().unwrap(),
        repeat_days: days.iter().copied().collect(),
        enabled: true,
        name: None,
    }
}

/// `(weekday, hour, minute)` of every weekly trigger, sorted.
pub fn weekly_triggers(notifications: &[ScheduledNotification]) -> Vec<(RepeatDay, u32, u32)> {
    let mut triggers: Vec<_> = notifications
        .iter()
        .filter_map(|notification| match notification.trigger {
            NotificationTrigger::Weekly {
                weekday,
                hour,
                minute,
            } => Some((weekday, hour, minute)),
            _ => None,
        })
        .collect();
    triggers.sort();
    triggers
}
