use std::{collections::BTreeSet, fmt};

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::alarm::{AlarmId, RepeatDay};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid alarm time {input:?}: {reason}")]
pub struct InvalidAlarmTime {
    pub input: String,
    pub reason: &'static str,
}

impl InvalidAlarmTime {
    pub(crate) fn new(input: impl Into<String>, reason: &'static str) -> Self {
        Self {
            input: input.into(),
            reason,
        }
    }
}

/// One notification request the scheduler refused.
#[derive(Debug)]
pub struct TriggerFailure {
    pub weekday: RepeatDay,
    /// Set for one-shot fallback triggers.
    pub occurrence: Option<NaiveDateTime>,
    pub error: anyhow::Error,
}

impl fmt::Display for TriggerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.occurrence {
            Some(occurrence) => write!(f, "{} at {}: {:#}", self.weekday, occurrence, self.error),
            None => write!(f, "{}: {:#}", self.weekday, self.error),
        }
    }
}

/// Aggregate of every trigger that failed while scheduling one alarm.
///
/// `scheduled` holds the identifiers that did succeed; they are persisted
/// so a later cancellation can still find them.
#[derive(Debug)]
pub struct SchedulingError {
    pub alarm_id: AlarmId,
    pub failures: Vec<TriggerFailure>,
    pub scheduled: Vec<String>,
}

impl SchedulingError {
    pub fn failed_days(&self) -> BTreeSet<RepeatDay> {
        self.failures.iter().map(|failure| failure.weekday).collect()
    }
}

impl fmt::Display for SchedulingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.failures.len() + self.scheduled.len();
        write!(
            f,
            "failed to schedule {} of {} notifications for alarm {}",
            self.failures.len(),
            total,
            self.alarm_id
        )?;
        for (i, failure) in self.failures.iter().enumerate() {
            let separator = if i == 0 { ": " } else { "; " };
            write!(f, "{separator}{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SchedulingError {}

#[derive(Debug, Error)]
pub enum AlarmError {
    #[error(transparent)]
    Validation(#[from] InvalidAlarmTime),

    #[error("notification permission was denied")]
    PermissionDenied,

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error("alarm {0} does not exist")]
    NotFound(AlarmId),

    #[error("alarm store failure: {0:#}")]
    Store(#[source] anyhow::Error),

    #[error("notification scheduler failure: {0:#}")]
    Notification(#[source] anyhow::Error),

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}
