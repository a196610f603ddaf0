use std::fmt;

use chrono::Weekday;

use crate::reminder::{ReminderKind, ReminderRecord};

/// Five-field cron expression (`minute hour day-of-month month day-of-week`).
///
/// Only minute, hour and day-of-week are ever bound; `None` renders as `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronExpression {
    pub minute: Option<u8>,
    pub hour: Option<u8>,
    pub day_of_week: Option<Weekday>,
}

impl CronExpression {
    pub const EVERY_MINUTE: Self = Self {
        minute: None,
        hour: None,
        day_of_week: None,
    };

    pub const EVERY_HOUR: Self = Self {
        minute: Some(0),
        hour: None,
        day_of_week: None,
    };
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = |v: Option<u8>| v.map_or_else(|| "*".to_string(), |v| v.to_string());
        let dow = self.day_of_week.map_or("*", weekday_code);
        write!(f, "{} {} * * {dow}", field(self.minute), field(self.hour))
    }
}

pub fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MON",
        Weekday::Tue => "TUE",
        Weekday::Wed => "WED",
        Weekday::Thu => "THU",
        Weekday::Fri => "FRI",
        Weekday::Sat => "SAT",
        Weekday::Sun => "SUN",
    }
}

/// Derive the recurrence expression for a record. Time fields are taken
/// verbatim from the record, already in the operating timezone.
pub fn derive(record: &ReminderRecord) -> CronExpression {
    let (minute, hour) = match record.time_of_day {
        Some(t) => (Some(t.minute), Some(t.hour)),
        None => (None, None),
    };
    match record.kind {
        ReminderKind::EveryMinute => CronExpression::EVERY_MINUTE,
        ReminderKind::EveryHour => CronExpression::EVERY_HOUR,
        ReminderKind::EveryDay | ReminderKind::OneTime => CronExpression {
            minute,
            hour,
            day_of_week: None,
        },
        ReminderKind::WeekdayOnce(day) | ReminderKind::WeekdayRecurring(day) => CronExpression {
            minute,
            hour,
            day_of_week: Some(day),
        },
    }
}

/// The schedule a recurring record contributes to the cadence artifact.
pub fn recurring_schedule(record: &ReminderRecord) -> Option<CronExpression> {
    record.kind.recurs().then(|| derive(record))
}
