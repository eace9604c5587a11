mod alarm_scheduler;
mod clock;

pub use alarm_scheduler::{
    ALARM_NOTIFICATION_PREFIX, AlarmScheduler, CancelReport, ScheduleOutcome, SchedulingOptions,
};
pub use clock::{Clock, SystemClock};
