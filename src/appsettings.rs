use std::{path::PathBuf, time::Duration};

use chrono_tz::Tz;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use serde::Deserialize;

use crate::{notification::InProcessSchedulerOptions, scheduling::SchedulingOptions};

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    pub path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./alarm-data"),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct NotificationSettings {
    pub timezone: Tz,
    pub weekly_recurrence: bool,
    /// Off emulates a platform without background notifications.
    pub background_scheduling: bool,
    pub permission_granted: bool,
    pub lookahead_weeks: u32,
    pub title: String,
    pub body: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        let scheduling = SchedulingOptions::default();
        Self {
            timezone: Tz::UTC,
            weekly_recurrence: true,
            background_scheduling: true,
            permission_granted: true,
            lookahead_weeks: scheduling.lookahead_weeks,
            title: scheduling.title,
            body: scheduling.body,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DaemonSettings {
    pub renewal_interval_secs: u64,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            renewal_interval_secs: 6 * 60 * 60,
        }
    }
}

impl DaemonSettings {
    pub fn renewal_interval(&self) -> Duration {
        Duration::from_secs(self.renewal_interval_secs.max(1))
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub storage: StorageSettings,
    pub notifications: NotificationSettings,
    pub daemon: DaemonSettings,
}

impl AppSettings {
    /// `appsettings`, then `appsettings.local`, then `APP__*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_builder(
            Config::builder()
                .add_source(File::with_name("appsettings").required(false))
                .add_source(File::with_name("appsettings.local").required(false))
                .add_source(Environment::with_prefix("APP").separator("__")),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }

    pub fn scheduling_options(&self) -> SchedulingOptions {
        SchedulingOptions {
            title: self.notifications.title.clone(),
            body: self.notifications.body.clone(),
            lookahead_weeks: self.notifications.lookahead_weeks,
        }
    }

    pub fn in_process_options(&self) -> InProcessSchedulerOptions {
        InProcessSchedulerOptions {
            weekly_recurrence: self.notifications.weekly_recurrence,
            permission_granted: self.notifications.permission_granted,
        }
    }
}
