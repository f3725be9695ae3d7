use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Inclusive timestamp range applied to sample, reception or result dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWindow {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl ReportWindow {
    pub fn new(from: NaiveDateTime, to: NaiveDateTime) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.from <= at && at <= self.to
    }

    pub fn contains_opt(&self, at: Option<NaiveDateTime>) -> bool {
        at.is_some_and(|at| self.contains(at))
    }

    /// Laboratory shift: yesterday 21:00 through today 20:59:59.
    pub fn shift_default(now: NaiveDateTime) -> Self {
        let today = now.date();
        let yesterday = today - Duration::days(1);
        Self {
            from: yesterday.and_time(at(21, 0, 0)),
            to: today.and_time(at(20, 59, 59)),
        }
    }

    /// Shift-style window from raw `from`/`to` query values.
    ///
    /// Values that fail to parse fall back to the shift default.
    pub fn shift_from_query(from: Option<&str>, to: Option<&str>, now: NaiveDateTime) -> Self {
        let fallback = Self::shift_default(now);
        match from.and_then(|raw| parse_bound(raw, false)) {
            Some(from) => Self {
                from,
                to: to
                    .and_then(|raw| parse_bound(raw, true))
                    .unwrap_or(fallback.to),
            },
            None => fallback,
        }
    }

    /// Whole-day window: `from 00:00:00` to `to 23:59:59`, defaulting to
    /// yesterday 00:00 through `now`.
    pub fn day_bounds(from: Option<&str>, to: Option<&str>, now: NaiveDateTime) -> Self {
        let fallback = Self::since_yesterday(now);
        let from_day = from.and_then(parse_day);
        match from_day {
            Some(from_day) => {
                let to_day = to.and_then(parse_day).unwrap_or_else(|| now.date());
                Self {
                    from: from_day.and_time(NaiveTime::MIN),
                    to: end_of_day(to_day),
                }
            }
            None => fallback,
        }
    }

    /// Yesterday 00:00 through `now`.
    pub fn since_yesterday(now: NaiveDateTime) -> Self {
        let yesterday = now.date() - Duration::days(1);
        Self {
            from: yesterday.and_time(NaiveTime::MIN),
            to: now,
        }
    }

    pub fn last_days(now: NaiveDateTime, days: i64) -> Self {
        Self {
            from: now - Duration::days(days),
            to: now,
        }
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            from: day.and_time(NaiveTime::MIN),
            to: end_of_day(day),
        }
    }

    /// Calendar month containing `now`.
    pub fn month_of(now: NaiveDateTime) -> Self {
        let first = now.date().with_day(1).unwrap_or_else(|| now.date());
        let next_month = if first.month() == 12 {
            NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
        };
        let last = next_month
            .map(|next| next - Duration::days(1))
            .unwrap_or(first);
        Self {
            from: first.and_time(NaiveTime::MIN),
            to: end_of_day(last),
        }
    }

    pub fn month_from_query(from: Option<&str>, to: Option<&str>, now: NaiveDateTime) -> Self {
        match from.and_then(parse_day) {
            Some(_) => Self::day_bounds(from, to, now),
            None => Self::month_of(now),
        }
    }
}

fn at(hour: u32, minute: u32, second: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, second).unwrap_or(NaiveTime::MIN)
}

pub(crate) fn end_of_day(day: NaiveDate) -> NaiveDateTime {
    day.and_time(at(23, 59, 59))
}

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y%m%d%H%M%S",
];

/// Lenient timestamp parsing for query strings and lab-interface payloads.
///
/// A bare date resolves to the start of the day, or to 23:59:59 when
/// `end_of_day_for_dates` is set.
pub fn parse_bound(raw: &str, end_of_day_for_dates: bool) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.naive_local());
    }

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }

    parse_day(trimmed).map(|day| {
        if end_of_day_for_dates {
            end_of_day(day)
        } else {
            day.and_time(NaiveTime::MIN)
        }
    })
}

pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y%m%d"))
        .ok()
}
