use std::iter;

use chrono::{Datelike, Days, NaiveDateTime, NaiveTime, Weekday};

use crate::alarm::RepeatDay;

/// First local datetime strictly after `after` that falls on `weekday` at `time`.
///
/// `None` only at the very end of chrono's representable range.
pub fn next_occurrence(
    weekday: RepeatDay,
    time: NaiveTime,
    after: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let target = Weekday::from(weekday).num_days_from_monday();
    let current = after.weekday().num_days_from_monday();
    let days_ahead = (7 + target - current) % 7;

    let candidate = after
        .date()
        .checked_add_days(Days::new(days_ahead.into()))?
        .and_time(time);

    if candidate > after {
        Some(candidate)
    } else {
        candidate.checked_add_days(Days::new(7))
    }
}

/// The next `count` occurrences after `after`, one week apart.
pub fn upcoming_occurrences(
    weekday: RepeatDay,
    time: NaiveTime,
    after: NaiveDateTime,
    count: u32,
) -> Vec<NaiveDateTime> {
    iter::successors(next_occurrence(weekday, time, after), |previous| {
        previous.checked_add_days(Days::new(7))
    })
    .take(count as usize)
    .collect()
}
