use chrono::Weekday;
use thiserror::Error;

pub const FIELD_SEPARATOR: &str = " - ";
pub const DEFAULT_MESSAGE: &str = "Reminder!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    EveryMinute,
    EveryHour,
    EveryDay,
    OneTime,
    WeekdayOnce(Weekday),
    WeekdayRecurring(Weekday),
}

impl ReminderKind {
    /// Interval kinds fire on a fixed cadence and carry no time of day.
    pub fn is_interval(self) -> bool {
        matches!(self, Self::EveryMinute | Self::EveryHour)
    }

    /// One-shot kinds are retired from the store after they fire.
    pub fn is_one_shot(self) -> bool {
        matches!(self, Self::OneTime | Self::WeekdayOnce(_))
    }

    pub fn recurs(self) -> bool {
        !self.is_one_shot()
    }

    fn from_token(token: &str) -> Option<Self> {
        let token = token.trim().to_ascii_lowercase();
        match token.as_str() {
            "every_minute" => return Some(Self::EveryMinute),
            "every_hour" => return Some(Self::EveryHour),
            "everyday" | "every_day" => return Some(Self::EveryDay),
            "one_time" => return Some(Self::OneTime),
            _ => {}
        }
        if let Some(day) = token.strip_suffix("_recur") {
            return parse_weekday(day).map(Self::WeekdayRecurring);
        }
        parse_weekday(&token).map(Self::WeekdayOnce)
    }
}

fn parse_weekday(token: &str) -> Option<Weekday> {
    let day = match token {
        "mon" | "monday" => Weekday::Mon,
        "tue" | "tuesday" => Weekday::Tue,
        "wed" | "wednesday" => Weekday::Wed,
        "thu" | "thursday" => Weekday::Thu,
        "fri" | "friday" => Weekday::Fri,
        "sat" | "saturday" => Weekday::Sat,
        "sun" | "sunday" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

/// Wall-clock time in 24-hour form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    /// Parse a 12-hour token such as `6 AM`, `6:30 pm` or `12PM`.
    pub fn parse_12h(token: &str) -> Option<Self> {
        let token = token.trim();
        let split = token.len().checked_sub(2)?;
        if !token.is_char_boundary(split) {
            return None;
        }
        let (clock, meridiem) = token.split_at(split);
        let pm = match meridiem.to_ascii_uppercase().as_str() {
            "AM" => false,
            "PM" => true,
            _ => return None,
        };

        let clock = clock.trim_end();
        let (hour, minute) = match clock.split_once(':') {
            Some((h, m)) if m.len() == 2 => (h, m),
            Some(_) => return None,
            None => (clock, "0"),
        };
        if !is_digits(hour) || !is_digits(minute) {
            return None;
        }
        let hour: u8 = hour.parse().ok()?;
        let minute: u8 = minute.parse().ok()?;
        if !(1..=12).contains(&hour) {
            return None;
        }

        let hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, false) => h,
            (h, true) => h + 12,
        };
        Self::new(hour, minute)
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderRecord {
    pub kind: ReminderKind,
    pub time_of_day: Option<TimeOfDay>,
    pub message: String,
}

impl ReminderRecord {
    /// Build a record, rejecting a time that disagrees with the kind.
    pub fn new(
        kind: ReminderKind,
        time_of_day: Option<TimeOfDay>,
        message: impl Into<String>,
    ) -> Result<Self, ParseError> {
        match (kind.is_interval(), time_of_day.is_some()) {
            (true, true) => return Err(ParseError::UnexpectedTime),
            (false, false) => return Err(ParseError::MissingTime),
            _ => {}
        }
        let message = message.into();
        let message = if message.trim().is_empty() {
            DEFAULT_MESSAGE.to_string()
        } else {
            message.trim().to_string()
        };
        Ok(Self {
            kind,
            time_of_day,
            message,
        })
    }

    /// Parse one stored line of the form `type - time - message`.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let fields = split_fields(line);
        let type_token = fields[0];
        let kind = ReminderKind::from_token(type_token)
            .ok_or_else(|| ParseError::UnknownType(type_token.to_string()))?;
        let second = fields.get(1).copied();
        let third = fields.get(2).copied();

        if kind.is_interval() {
            return match (second, third) {
                (None, _) => Self::new(kind, None, ""),
                (Some(message), None) => Self::new(kind, None, message),
                (Some(time), Some(message)) if time.is_empty() => {
                    Self::new(kind, None, message)
                }
                (Some(_), Some(_)) => Err(ParseError::UnexpectedTime),
            };
        }

        let time_token = second
            .filter(|t| !t.is_empty())
            .ok_or(ParseError::MissingTime)?;
        let time = TimeOfDay::parse_12h(time_token)
            .ok_or_else(|| ParseError::InvalidTime(time_token.trim().to_string()))?;
        Self::new(kind, Some(time), third.unwrap_or_default())
    }
}

/// Split into at most three trimmed fields. A separator dangling at the end
/// of the line (`everyday - 9 AM -`) leaves an empty last field.
fn split_fields(line: &str) -> Vec<&str> {
    let mut fields: Vec<&str> = line
        .trim()
        .splitn(3, FIELD_SEPARATOR)
        .map(str::trim)
        .collect();
    if fields.len() < 3 {
        if let Some(head) = fields.last().copied().and_then(|last| last.strip_suffix(" -")) {
            let head = head.trim_end();
            fields.pop();
            fields.push(head);
            fields.push("");
        }
    }
    fields
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown reminder type '{0}'")]
    UnknownType(String),
    #[error("reminder type requires a time of day")]
    MissingTime,
    #[error("invalid 12-hour time '{0}' (expected e.g. '9 AM' or '6:30 PM')")]
    InvalidTime(String),
    #[error("interval reminders do not take a time of day")]
    UnexpectedTime,
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

/// A stored line paired with its parse result. Blank lines have no record.
/// `raw` is lossily decoded for logs and keys; the store keeps the bytes.
#[derive(Debug, Clone)]
pub struct ParsedLine {
    pub raw: String,
    pub record: Option<Result<ReminderRecord, ParseError>>,
}

impl ParsedLine {
    pub fn valid(&self) -> Option<&ReminderRecord> {
        self.record.as_ref().and_then(|r| r.as_ref().ok())
    }
}

pub fn parse_lines<L: AsRef<[u8]>>(lines: &[L]) -> Vec<ParsedLine> {
    lines
        .iter()
        .map(|bytes| match std::str::from_utf8(bytes.as_ref()) {
            Ok(raw) => ParsedLine {
                raw: raw.to_string(),
                record: (!raw.trim().is_empty()).then(|| ReminderRecord::parse(raw)),
            },
            Err(_) => ParsedLine {
                raw: String::from_utf8_lossy(bytes.as_ref()).into_owned(),
                record: Some(Err(ParseError::InvalidUtf8)),
            },
        })
        .collect()
}
