use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Every calendar day of a month, ascending. `month_index` is 0-based;
/// an out-of-range index yields no days.
pub fn month_days(year: i32, month_index: u32) -> Vec<NaiveDate> {
    let Some(first) = month_index
        .checked_add(1)
        .and_then(|month| NaiveDate::from_ymd_opt(year, month, 1))
    else {
        return Vec::new();
    };

    first
        .iter_days()
        .take_while(|day| day.month() == first.month())
        .collect()
}

/// Monday 00:00:00.000 through Sunday 23:59:59.999 of the week containing `date`.
pub fn week_range(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let monday = week_start(date);
    let start = monday.and_time(NaiveTime::MIN);
    let end = (monday + Duration::days(7)).and_time(NaiveTime::MIN) - Duration::milliseconds(1);
    (start, end)
}

/// Canonical `YYYY-MM-DD` key.
pub fn format_date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key.trim(), "%Y-%m-%d").ok()
}

/// Today in the local time zone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// The tracked calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub year: i32,
    pub month_index: u32,
}

impl Period {
    pub fn new(year: i32, month_index: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month_index.checked_add(1)?, 1)?;
        Some(Self { year, month_index })
    }

    /// Parses `YYYY-MM` (1-based month, as written on a calendar).
    pub fn parse(raw: &str) -> Option<Self> {
        let (year, month) = raw.trim().split_once('-')?;
        let year = year.parse::<i32>().ok()?;
        let month = month.parse::<u32>().ok()?;
        if month == 0 {
            return None;
        }
        Self::new(year, month - 1)
    }

    /// February of the current local year.
    pub fn sober_february() -> Self {
        Self {
            year: today().year(),
            month_index: 1,
        }
    }

    pub fn days(&self) -> Vec<NaiveDate> {
        month_days(self.year, self.month_index)
    }

    pub fn start(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month_index + 1, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn end_exclusive(&self) -> NaiveDate {
        let (year, month) = if self.month_index == 11 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month_index + 2)
        };
        NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start() && day < self.end_exclusive()
    }

    pub fn day_count(&self) -> usize {
        (self.end_exclusive() - self.start()).num_days() as usize
    }

    pub fn label(&self) -> String {
        format!("{} {}", MONTH_NAMES[self.month_index as usize % 12], self.year)
    }
}
