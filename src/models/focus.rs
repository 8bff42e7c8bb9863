use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    Month,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
        }
    }

    /// Grouping key a store uses for a calendar day: `YYYY-MM-DD`, `YYYY-Www` (ISO) or `YYYY-MM`.
    pub fn raw_key(self, day: NaiveDate) -> String {
        match self {
            Period::Day => day.format("%Y-%m-%d").to_string(),
            Period::Week => {
                let week = day.iso_week();
                format!("{:04}-W{:02}", week.year(), week.week())
            }
            Period::Month => day.format("%Y-%m").to_string(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPeriod(pub String);

impl FromStr for Period {
    type Err = UnknownPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            other => Err(UnknownPeriod(other.to_string())),
        }
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYY-MM` or `YYYY/MM`; month forms mean the 1st.
pub fn parse_anchor_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    for (fmt, sep) in [("%Y-%m-%d", '-'), ("%Y/%m/%d", '/')] {
        if let Ok(day) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(day);
        }
        if let Ok(day) = NaiveDate::parse_from_str(&format!("{}{}01", raw, sep), fmt) {
            return Some(day);
        }
    }
    None
}

/// Half-open `[start, end)` interval of instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Midnight of `start` up to (not including) midnight of `end`, both UTC.
    pub fn days(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: start.and_time(chrono::NaiveTime::MIN).and_utc(),
            end: end.and_time(chrono::NaiveTime::MIN).and_utc(),
        }
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self::days(day, day.succ_opt().unwrap_or(day))
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Minutes of finished work per bucket key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Distribution {
    pub period: Period,
    pub data: BTreeMap<String, i64>,
}

impl Distribution {
    pub fn total_minutes(&self) -> i64 {
        self.data.values().fold(0i64, |acc, m| acc.saturating_add(*m))
    }
}

/// Raw counters returned by the task store for finished tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FocusTotals {
    pub finished_count: u64,
    pub duration_minutes: i64,
    pub active_days: u64,
}

#[derive(Debug, Serialize)]
pub struct FocusStats {
    pub focus_count: u64,
    pub focus_duration_minutes: i64,
    pub tasks_completed: u64,
}

#[derive(Debug, Serialize)]
pub struct TotalFocusStats {
    pub focus_count: u64,
    pub focus_duration_minutes: i64,
    pub tasks_completed: u64,
    pub avg_daily_duration: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_date_forms() {
        let may_15 = NaiveDate::from_ymd_opt(2025, 5, 15);
        let may_1 = NaiveDate::from_ymd_opt(2025, 5, 1);
        assert_eq!(parse_anchor_date("2025-05-15"), may_15);
        assert_eq!(parse_anchor_date("2025/05/15"), may_15);
        assert_eq!(parse_anchor_date("2025-05"), may_1);
        assert_eq!(parse_anchor_date("2025/05"), may_1);
        assert_eq!(parse_anchor_date("15.05.2025"), None);
        assert_eq!(parse_anchor_date("2025-13"), None);
        assert_eq!(parse_anchor_date(""), None);
    }

    #[test]
    fn iso_week_keys_use_the_iso_year() {
        let dec_31 = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        assert_eq!(Period::Week.raw_key(dec_31), "2026-W01");
        assert_eq!(Period::Month.raw_key(dec_31), "2025-12");
        assert_eq!(Period::Day.raw_key(dec_31), "2025-12-31");
    }

    #[test]
    fn single_day_range_is_half_open() {
        let day = NaiveDate::from_ymd_opt(2025, 5, 15).unwrap();
        let range = DateRange::single_day(day);
        assert!(range.contains(day.and_hms_opt(0, 0, 0).unwrap().and_utc()));
        assert!(range.contains(day.and_hms_opt(23, 59, 59).unwrap().and_utc()));
        assert!(!range.contains(range.end));
    }
}
