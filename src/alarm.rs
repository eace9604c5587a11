use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::InvalidAlarmTime;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmId(String);

impl AlarmId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AlarmId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AlarmId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Day of the week an alarm repeats on.
///
/// Ordered Sunday first, the way the check-in app lists them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatDay {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl RepeatDay {
    pub const ALL: [RepeatDay; 7] = [
        RepeatDay::Sunday,
        RepeatDay::Monday,
        RepeatDay::Tuesday,
        RepeatDay::Wednesday,
        RepeatDay::Thursday,
        RepeatDay::Friday,
        RepeatDay::Saturday,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RepeatDay::Sunday => "sunday",
            RepeatDay::Monday => "monday",
            RepeatDay::Tuesday => "tuesday",
            RepeatDay::Wednesday => "wednesday",
            RepeatDay::Thursday => "thursday",
            RepeatDay::Friday => "friday",
            RepeatDay::Saturday => "saturday",
        }
    }
}

impl fmt::Display for RepeatDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown day {0:?}, expected one of sunday..saturday")]
pub struct UnknownRepeatDay(String);

impl FromStr for RepeatDay {
    type Err = UnknownRepeatDay;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RepeatDay::ALL
            .into_iter()
            .find(|day| day.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownRepeatDay(s.to_owned()))
    }
}

impl From<RepeatDay> for Weekday {
    fn from(value: RepeatDay) -> Self {
        match value {
            RepeatDay::Sunday => Weekday::Sun,
            RepeatDay::Monday => Weekday::Mon,
            RepeatDay::Tuesday => Weekday::Tue,
            RepeatDay::Wednesday => Weekday::Wed,
            RepeatDay::Thursday => Weekday::Thu,
            RepeatDay::Friday => Weekday::Fri,
            RepeatDay::Saturday => Weekday::Sat,
        }
    }
}

impl From<Weekday> for RepeatDay {
    fn from(value: Weekday) -> Self {
        match value {
            Weekday::Sun => RepeatDay::Sunday,
            Weekday::Mon => RepeatDay::Monday,
            Weekday::Tue => RepeatDay::Tuesday,
            Weekday::Wed => RepeatDay::Wednesday,
            Weekday::Thu => RepeatDay::Thursday,
            Weekday::Fri => RepeatDay::Friday,
            Weekday::Sat => RepeatDay::Saturday,
        }
    }
}

/// Local wall-clock time an alarm fires at, with minute precision.
///
/// Stored and parsed as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AlarmTime(NaiveTime);

impl AlarmTime {
    pub fn from_hm(hour: u32, minute: u32) -> Result<Self, InvalidAlarmTime> {
        if hour > 23 {
            return Err(InvalidAlarmTime::new(
                format!("{hour:02}:{minute:02}"),
                "hour must be between 0 and 23",
            ));
        }
        if minute > 59 {
            return Err(InvalidAlarmTime::new(
                format!("{hour:02}:{minute:02}"),
                "minute must be between 0 and 59",
            ));
        }

        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(Self)
            .ok_or_else(|| InvalidAlarmTime::new(format!("{hour:02}:{minute:02}"), "out of range"))
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }
}

impl Default for AlarmTime {
    fn default() -> Self {
        Self(NaiveTime::from_hms_opt(9, 0, 0).expect("09:00 is a valid time"))
    }
}

impl FromStr for AlarmTime {
    type Err = InvalidAlarmTime;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hour, minute) = s
            .split_once(':')
            .ok_or_else(|| InvalidAlarmTime::new(s, "expected HH:MM"))?;

        let is_two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
        if !is_two_digits(hour) || !is_two_digits(minute) {
            return Err(InvalidAlarmTime::new(s, "expected HH:MM"));
        }

        let hour = hour.parse().map_err(|_| InvalidAlarmTime::new(s, "expected HH:MM"))?;
        let minute = minute.parse().map_err(|_| InvalidAlarmTime::new(s, "expected HH:MM"))?;

        Self::from_hm(hour, minute).map_err(|e| InvalidAlarmTime::new(s, e.reason))
    }
}

impl TryFrom<String> for AlarmTime {
    type Error = InvalidAlarmTime;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AlarmTime> for String {
    fn from(value: AlarmTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for AlarmTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// A user-configured recurring check-in reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub id: AlarmId,
    pub time: AlarmTime,
    /// Empty means every day.
    #[serde(default)]
    pub repeat_days: BTreeSet<RepeatDay>,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Alarm {
    /// A fresh alarm at 09:00, enabled, repeating every day.
    pub fn new() -> Self {
        Self {
            id: AlarmId::generate(),
            time: AlarmTime::default(),
            repeat_days: BTreeSet::new(),
            enabled: true,
            name: None,
        }
    }

    pub fn effective_days(&self) -> Vec<RepeatDay> {
        if self.repeat_days.is_empty() {
            RepeatDay::ALL.to_vec()
        } else {
            self.repeat_days.iter().copied().collect()
        }
    }
}

impl Default for Alarm {
    fn default() -> Self {
        Self::new()
    }
}
