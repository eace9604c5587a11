use std::sync::Arc;

use anyhow::Context;
use tokio::sync::Mutex;

use crate::{
    alarm::{Alarm, AlarmId},
    error::AlarmError,
};

use super::KeyValueStore;

pub const ALARM_LIST_KEY: &str = "alarm_list";
pub const SCHEDULED_IDS_KEY_PREFIX: &str = "alarm_scheduled_ids";

/// Alarm definitions plus, per alarm, the identifiers of its live notifications.
pub struct AlarmStore {
    kv: Arc<dyn KeyValueStore>,
    list_lock: Mutex<()>,
}

impl AlarmStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            list_lock: Mutex::new(()),
        }
    }

    pub async fn list(&self) -> Result<Vec<Alarm>, AlarmError> {
        self.read_list().await
    }

    pub async fn get(&self, id: &AlarmId) -> Result<Option<Alarm>, AlarmError> {
        let alarms = self.read_list().await?;
        Ok(alarms.into_iter().find(|alarm| &alarm.id == id))
    }

    /// Replaces the alarm with the same id in place, or appends it.
    pub async fn upsert(&self, alarm: &Alarm) -> Result<(), AlarmError> {
        let _guard = self.list_lock.lock().await;
        let mut alarms = self.read_list().await?;

        match alarms.iter_mut().find(|existing| existing.id == alarm.id) {
            Some(existing) => *existing = alarm.clone(),
            None => alarms.push(alarm.clone()),
        }

        self.write_list(&alarms).await
    }

    pub async fn remove(&self, id: &AlarmId) -> Result<bool, AlarmError> {
        let _guard = self.list_lock.lock().await;
        let mut alarms = self.read_list().await?;

        let before = alarms.len();
        alarms.retain(|alarm| &alarm.id != id);
        if alarms.len() == before {
            return Ok(false);
        }

        self.write_list(&alarms).await?;
        Ok(true)
    }

    pub async fn scheduled_ids(&self, id: &AlarmId) -> Result<Vec<String>, AlarmError> {
        let key = scheduled_ids_key(id);
        let raw = self.kv.get(&key).await.map_err(AlarmError::Store)?;

        match raw {
            Some(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Stored value under {key} is not a list of identifiers"))
                .map_err(AlarmError::Store),
            None => Ok(vec![]),
        }
    }

    /// Replaces the whole set. An empty set removes the key.
    pub async fn set_scheduled_ids(&self, id: &AlarmId, ids: &[String]) -> Result<(), AlarmError> {
        if ids.is_empty() {
            return self.clear_scheduled_ids(id).await;
        }

        let value = serde_json::to_string(ids)
            .context("Unable to serialize notification identifiers")
            .map_err(AlarmError::Store)?;
        self.kv
            .set(&scheduled_ids_key(id), value)
            .await
            .map_err(AlarmError::Store)
    }

    pub async fn clear_scheduled_ids(&self, id: &AlarmId) -> Result<(), AlarmError> {
        self.kv
            .remove(&scheduled_ids_key(id))
            .await
            .map_err(AlarmError::Store)
    }

    async fn read_list(&self) -> Result<Vec<Alarm>, AlarmError> {
        let raw = self.kv.get(ALARM_LIST_KEY).await.map_err(AlarmError::Store)?;

        match raw {
            Some(raw) => serde_json::from_str(&raw)
                .context("Stored alarm list is not valid")
                .map_err(AlarmError::Store),
            None => Ok(vec![]),
        }
    }

    async fn write_list(&self, alarms: &[Alarm]) -> Result<(), AlarmError> {
        let value = serde_json::to_string(alarms)
            .context("Unable to serialize alarm list")
            .map_err(AlarmError::Store)?;
        self.kv
            .set(ALARM_LIST_KEY, value)
            .await
            .map_err(AlarmError::Store)
    }
}

fn scheduled_ids_key(id: &AlarmId) -> String {
    format!("{SCHEDULED_IDS_KEY_PREFIX}:{id}")
}
