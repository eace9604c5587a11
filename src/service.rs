use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    alarm::{Alarm, AlarmId},
    error::AlarmError,
    notification::ScheduledNotification,
    scheduling::{AlarmScheduler, ScheduleOutcome},
    storage::AlarmStore,
};

/// Serializes every operation that touches one alarm.
#[derive(Default)]
struct AlarmLocks(Mutex<HashMap<AlarmId, Arc<Mutex<()>>>>);

impl AlarmLocks {
    async fn acquire(&self, id: &AlarmId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.0.lock().await;
            Arc::clone(locks.entry(id.clone()).or_default())
        };

        lock.lock_owned().await
    }

    /// Drops the lock entry unless another caller still holds or awaits it.
    async fn forget(&self, id: &AlarmId) {
        let mut locks = self.0.lock().await;
        if locks
            .get(id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(id);
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub reconciled: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Alarms that were gone from the store but still had live notifications.
    pub orphaned: usize,
}

/// What callers use to manage alarms: persistence and notifications kept in step.
pub struct AlarmService {
    store: Arc<AlarmStore>,
    scheduler: Arc<AlarmScheduler>,
    locks: AlarmLocks,
}

impl AlarmService {
    pub fn new(store: Arc<AlarmStore>, scheduler: Arc<AlarmScheduler>) -> Self {
        Self {
            store,
            scheduler,
            locks: AlarmLocks::default(),
        }
    }

    pub async fn list(&self) -> Result<Vec<Alarm>, AlarmError> {
        self.store.list().await
    }

    pub async fn get(&self, id: &AlarmId) -> Result<Option<Alarm>, AlarmError> {
        self.store.get(id).await
    }

    /// A fresh, unsaved alarm with a generated id.
    pub fn new_alarm(&self) -> Alarm {
        Alarm::new()
    }

    /// Persists the alarm, then schedules or cancels its notifications.
    ///
    /// The definition stays saved when scheduling fails.
    pub async fn save(&self, alarm: Alarm) -> Result<ScheduleOutcome, AlarmError> {
        let _guard = self.locks.acquire(&alarm.id).await;

        self.store.upsert(&alarm).await?;
        log::info!(
            "Saved alarm. [alarm_id = {}, time = {}, enabled = {}]",
            alarm.id,
            alarm.time,
            alarm.enabled
        );

        self.apply(&alarm).await
    }

    pub async fn toggle(&self, id: &AlarmId, enabled: bool) -> Result<ScheduleOutcome, AlarmError> {
        let _guard = self.locks.acquire(id).await;

        let mut alarm = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AlarmError::NotFound(id.clone()))?;

        alarm.enabled = enabled;
        self.store.upsert(&alarm).await?;
        log::info!("Toggled alarm. [alarm_id = {id}, enabled = {enabled}]");

        self.apply(&alarm).await
    }

    /// Cancels the alarm's notifications and removes it.
    ///
    /// Returns `false` when no such alarm was stored. Leftover notifications
    /// under that id are cancelled either way.
    pub async fn delete(&self, id: &AlarmId) -> Result<bool, AlarmError> {
        let guard = self.locks.acquire(id).await;

        self.scheduler.cancel_single_alarm(id).await?;
        let removed = self.store.remove(id).await?;
        if removed {
            log::info!("Deleted alarm. [alarm_id = {id}]");
        } else {
            log::debug!("Nothing to delete. [alarm_id = {id}]");
        }

        drop(guard);
        self.locks.forget(id).await;

        Ok(removed)
    }

    pub async fn scheduled_notifications(
        &self,
        id: &AlarmId,
    ) -> Result<Vec<ScheduledNotification>, AlarmError> {
        self.scheduler.scheduled_notifications(id).await
    }

    pub async fn send_test_notification(&self) -> Result<String, AlarmError> {
        self.scheduler.send_test_notification().await
    }

    /// Brings live notifications back in line with the stored alarms.
    ///
    /// Run at startup and periodically; also renews one-shot fallback
    /// notifications before they run out, and cancels notifications of
    /// alarms deleted elsewhere. Failures for one alarm are logged and do
    /// not stop the others.
    pub async fn restore(&self) -> Result<RestoreReport, AlarmError> {
        let alarms = self.store.list().await?;
        let mut report = RestoreReport::default();
        let stored: HashSet<AlarmId> = alarms.iter().map(|alarm| alarm.id.clone()).collect();

        for alarm in alarms {
            match self.restore_alarm(&alarm.id).await {
                Ok(true) => report.reconciled += 1,
                Ok(false) => report.unchanged += 1,
                Err(error) => {
                    log::error!(
                        "Unable to restore alarm. [alarm_id = {}, error = {}]",
                        alarm.id,
                        error
                    );
                    report.failed += 1;
                }
            }
        }

        match self.scheduler.live_alarm_ids().await {
            Ok(live) => {
                for id in live.into_iter().filter(|id| !stored.contains(id)) {
                    match self.cancel_orphan(&id).await {
                        Ok(true) => report.orphaned += 1,
                        Ok(false) => {}
                        Err(error) => {
                            log::error!(
                                "Unable to cancel notifications of deleted alarm. [alarm_id = {}, error = {}]",
                                id,
                                error
                            );
                            report.failed += 1;
                        }
                    }
                }
            }
            Err(error) => {
                log::error!("Unable to list live notifications. [error = {error}]");
                report.failed += 1;
            }
        }

        log::info!(
            "Restored alarms. [reconciled = {}, unchanged = {}, orphaned = {}, failed = {}]",
            report.reconciled,
            report.unchanged,
            report.orphaned,
            report.failed
        );

        Ok(report)
    }

    async fn restore_alarm(&self, id: &AlarmId) -> Result<bool, AlarmError> {
        let _guard = self.locks.acquire(id).await;

        // Re-read under the lock: it may have changed or gone since listing.
        let Some(alarm) = self.store.get(id).await? else {
            return Ok(false);
        };

        if !self.scheduler.needs_reschedule(&alarm).await? {
            return Ok(false);
        }

        log::info!("Alarm notifications are out of date. [alarm_id = {id}]");
        self.apply(&alarm).await?;
        Ok(true)
    }

    async fn cancel_orphan(&self, id: &AlarmId) -> Result<bool, AlarmError> {
        let guard = self.locks.acquire(id).await;

        // Saved again since the store was listed.
        if self.store.get(id).await?.is_some() {
            return Ok(false);
        }

        log::info!("Cancelling notifications of deleted alarm. [alarm_id = {id}]");
        self.scheduler.cancel_single_alarm(id).await?;

        drop(guard);
        self.locks.forget(id).await;

        Ok(true)
    }

    async fn apply(&self, alarm: &Alarm) -> Result<ScheduleOutcome, AlarmError> {
        if alarm.enabled {
            self.scheduler.schedule_single_alarm(alarm).await
        } else {
            self.scheduler.cancel_single_alarm(&alarm.id).await?;
            Ok(ScheduleOutcome::Disabled)
        }
    }
}
