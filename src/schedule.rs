use chrono::{DateTime, Datelike, TimeZone, Timelike};

use crate::cron::{self, CronExpression};
use crate::reminder::{ReminderKind, ReminderRecord, TimeOfDay};

/// Result of evaluating one reminder during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationOutcome {
    pub fired: bool,
    /// False only for a one-shot reminder that fired and was delivered.
    pub should_retain: bool,
    /// Present for kinds that recur.
    pub schedule: Option<CronExpression>,
    pub notify_error: Option<String>,
}

impl EvaluationOutcome {
    /// Outcome for a reminder that is not fired this pass.
    pub fn idle(record: &ReminderRecord) -> Self {
        Self {
            fired: false,
            should_retain: true,
            schedule: cron::recurring_schedule(record),
            notify_error: None,
        }
    }

    /// Keep the reminder when its notification could not be delivered.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.notify_error = Some(error.into());
        self.should_retain = true;
    }
}

/// Evaluate a record against `now`, assuming delivery succeeds.
pub fn evaluate<Tz: TimeZone>(record: &ReminderRecord, now: &DateTime<Tz>) -> EvaluationOutcome {
    let fired = is_due(record, now);
    EvaluationOutcome {
        fired,
        should_retain: !(fired && record.kind.is_one_shot()),
        ..EvaluationOutcome::idle(record)
    }
}

/// Whether `record` is due during the minute containing `now`.
///
/// Matching is stateless: a reminder bound to a minute is due for every
/// call made within that minute, so callers must run at most once a minute
/// (or enable the fired log) to avoid duplicate notifications.
pub fn is_due<Tz: TimeZone>(record: &ReminderRecord, now: &DateTime<Tz>) -> bool {
    match record.kind {
        ReminderKind::EveryMinute => true,
        ReminderKind::EveryHour => now.minute() == 0,
        ReminderKind::EveryDay | ReminderKind::OneTime => {
            matches_minute(record.time_of_day, now)
        }
        ReminderKind::WeekdayOnce(day) | ReminderKind::WeekdayRecurring(day) => {
            now.weekday() == day && matches_minute(record.time_of_day, now)
        }
    }
}

fn matches_minute<Tz: TimeZone>(time: Option<TimeOfDay>, now: &DateTime<Tz>) -> bool {
    time.is_some_and(|t| now.hour() == u32::from(t.hour) && now.minute() == u32::from(t.minute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Weekday};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(5 * 3600 + 1800)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
    }

    fn record(line: &str) -> ReminderRecord {
        ReminderRecord::parse(line).unwrap()
    }

    #[test]
    fn test_every_minute_always_due() {
        let r = record("every_minute");
        for (h, m) in [(0, 0), (6, 31), (23, 59), (12, 7)] {
            assert!(is_due(&r, &at(2026, 3, 4, h, m)));
        }
    }

    #[test]
    fn test_every_hour_due_on_the_hour() {
        let r = record("every_hour - Stretch");
        for m in 0..60 {
            assert_eq!(is_due(&r, &at(2026, 3, 4, 10, m)), m == 0, "minute {m}");
        }
    }

    #[test]
    fn test_everyday_exact_minute() {
        let r = record("everyday - 6:30 AM - Walk");
        assert!(is_due(&r, &at(2026, 3, 4, 6, 30)));
        assert!(!is_due(&r, &at(2026, 3, 4, 6, 31)));
        assert!(!is_due(&r, &at(2026, 3, 4, 7, 30)));
        assert!(!is_due(&r, &at(2026, 3, 4, 18, 30)));
        assert!(is_due(&r, &at(2026, 3, 5, 6, 30)));
    }

    #[test]
    fn test_one_time_matches_like_everyday() {
        let r = record("one_time - 5 PM - Call");
        assert!(is_due(&r, &at(2026, 3, 4, 17, 0)));
        assert!(!is_due(&r, &at(2026, 3, 4, 5, 0)));
    }

    #[test]
    fn test_weekday_recurring_only_on_that_day() {
        let r = record("mon_recur - 9 AM - Standup");
        assert_eq!(r.kind, ReminderKind::WeekdayRecurring(Weekday::Mon));
        // 2026-03-02 is a Monday.
        assert!(is_due(&r, &at(2026, 3, 2, 9, 0)));
        assert!(!is_due(&r, &at(2026, 3, 2, 9, 1)));
        for d in 3..=8 {
            assert!(!is_due(&r, &at(2026, 3, d, 9, 0)), "day {d}");
        }
        assert!(is_due(&r, &at(2026, 3, 9, 9, 0)));
    }

    #[test]
    fn test_weekday_once() {
        let r = record("sat - 11:15 PM - Bins");
        // 2026-03-07 is a Saturday.
        assert!(is_due(&r, &at(2026, 3, 7, 23, 15)));
        assert!(!is_due(&r, &at(2026, 3, 6, 23, 15)));
    }

    #[test]
    fn test_weekday_uses_local_offset() {
        let r = record("mon_recur - 12:30 AM - Early");
        // Monday 00:30 at +05:30 is Sunday 19:00 UTC.
        let local = at(2026, 3, 2, 0, 30);
        assert!(is_due(&r, &local));
        assert!(!is_due(&r, &local.with_timezone(&chrono::Utc)));
    }

    #[test]
    fn test_evaluate_retires_fired_one_shots_only() {
        let now = at(2026, 3, 2, 9, 0);

        let once = evaluate(&record("one_time - 9 AM - x"), &now);
        assert!(once.fired);
        assert!(!once.should_retain);
        assert_eq!(once.schedule, None);

        let weekday_once = evaluate(&record("mon - 9 AM - x"), &now);
        assert!(weekday_once.fired);
        assert!(!weekday_once.should_retain);

        let daily = evaluate(&record("everyday - 9 AM - x"), &now);
        assert!(daily.fired);
        assert!(daily.should_retain);
        assert_eq!(daily.schedule.map(|c| c.to_string()).as_deref(), Some("0 9 * * *"));

        let later = evaluate(&record("one_time - 10 AM - x"), &now);
        assert!(!later.fired);
        assert!(later.should_retain);
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let now = at(2026, 3, 2, 9, 0);
        for line in ["every_minute", "one_time - 9 AM - x", "sun_recur - 8 AM - y"] {
            let r = record(line);
            assert_eq!(evaluate(&r, &now), evaluate(&r, &now));
        }
    }

    #[test]
    fn test_failed_delivery_keeps_one_shot() {
        let now = at(2026, 3, 2, 9, 0);
        let mut outcome = evaluate(&record("one_time - 9 AM - x"), &now);
        outcome.record_failure("timeout");
        assert!(outcome.fired);
        assert!(outcome.should_retain);
        assert_eq!(outcome.notify_error.as_deref(), Some("timeout"));
    }
}
