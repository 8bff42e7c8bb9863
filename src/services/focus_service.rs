use std::{collections::BTreeMap, sync::Arc};

use chrono::{Datelike, NaiveDate, Weekday};
use tracing::{debug, instrument, warn};

use crate::db::TaskStore;
use crate::errors::AppError;
use crate::models::focus::{
    DateRange, Distribution, FocusStats, Period, TotalFocusStats, UnknownPeriod,
};

/// Every bucket key a completed distribution must contain, plus the
/// absolute date range those buckets cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketRange {
    pub keys: Vec<String>,
    pub range: DateRange,
}

/// Number of ISO-8601 weeks in `year` (52 or 53): the week holding December 28.
pub fn iso_weeks_in_year(year: i32) -> Option<u32> {
    NaiveDate::from_ymd_opt(year, 12, 28).map(|d| d.iso_week().week())
}

fn week_key(year: i32, week: u32) -> String {
    format!("{:04}-W{:02}", year, week)
}

pub fn canonical_buckets(period: Period, anchor: NaiveDate) -> Option<BucketRange> {
    let year = anchor.year();
    match period {
        Period::Day => {
            let first = anchor.with_day(1)?;
            let next_month = if anchor.month() == 12 {
                NaiveDate::from_ymd_opt(year + 1, 1, 1)?
            } else {
                NaiveDate::from_ymd_opt(year, anchor.month() + 1, 1)?
            };
            let keys = first
                .iter_days()
                .take_while(|d| *d < next_month)
                .map(|d| Period::Day.raw_key(d))
                .collect();
            Some(BucketRange {
                keys,
                range: DateRange::days(first, next_month),
            })
        }
        Period::Week => {
            let weeks = iso_weeks_in_year(year)?;
            let start = NaiveDate::from_isoywd_opt(year, 1, Weekday::Mon)?;
            let end = NaiveDate::from_isoywd_opt(year, weeks, Weekday::Sun)?.succ_opt()?;
            Some(BucketRange {
                keys: (1..=weeks).map(|w| week_key(year, w)).collect(),
                range: DateRange::days(start, end),
            })
        }
        Period::Month => {
            let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
            let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)?;
            let keys = (1..=12)
                .filter_map(|m| NaiveDate::from_ymd_opt(year, m, 1))
                .map(|d| Period::Month.raw_key(d))
                .collect();
            Some(BucketRange {
                keys,
                range: DateRange::days(start, end),
            })
        }
    }
}

/// Whether `key` looks like a bucket key of `period` (length and separator positions).
pub fn has_key_shape(period: Period, key: &str) -> bool {
    let b = key.as_bytes();
    match period {
        Period::Day => b.len() == 10 && b[4] == b'-' && b[7] == b'-',
        Period::Week => b.len() == 8 && b[4] == b'-' && b[5] == b'W',
        Period::Month => b.len() == 7 && b[4] == b'-',
    }
}

/// The canonical bucket holding `anchor`. For weeks the anchor's ISO week is
/// clamped into the anchor's calendar year, so early-January days that belong
/// to the previous ISO year land in week 1 and late-December days that belong
/// to the next ISO year land in the last week.
pub fn anchor_key(period: Period, anchor: NaiveDate) -> String {
    match period {
        Period::Day | Period::Month => period.raw_key(anchor),
        Period::Week => {
            let year = anchor.year();
            let iso = anchor.iso_week();
            let week = if iso.year() < year {
                1
            } else if iso.year() > year {
                iso_weeks_in_year(year).unwrap_or(52)
            } else {
                iso.week()
            };
            week_key(year, week)
        }
    }
}

/// Shape raw grouped sums into a complete distribution.
///
/// Rows whose key is not a canonical bucket (empty, malformed or out of range)
/// have their minutes folded into the anchor's bucket, so the total is preserved.
pub fn complete_distribution(
    period: Period,
    anchor: NaiveDate,
    buckets: &BucketRange,
    raw: Vec<(String, i64)>,
) -> Distribution {
    let mut data: BTreeMap<String, i64> = buckets.keys.iter().map(|k| (k.clone(), 0)).collect();
    let mut unassigned: i64 = 0;

    for (key, minutes) in raw {
        match data.get_mut(&key) {
            Some(slot) => *slot = slot.saturating_add(minutes),
            None => {
                if has_key_shape(period, &key) {
                    warn!(key = %key, minutes, "Grouped key outside requested buckets");
                } else {
                    warn!(key = %key, minutes, "Malformed grouped key");
                }
                unassigned = unassigned.saturating_add(minutes);
            }
        }
    }

    if unassigned != 0 {
        let target = anchor_key(period, anchor);
        debug!(bucket = %target, minutes = unassigned, "Folding unassigned minutes into anchor bucket");
        let slot = data.entry(target).or_insert(0);
        *slot = slot.saturating_add(unassigned);
    }

    Distribution { period, data }
}

#[derive(Clone)]
pub struct FocusService {
    tasks: Arc<dyn TaskStore>,
}

impl FocusService {
    pub fn new(tasks: Arc<dyn TaskStore>) -> Self {
        Self { tasks }
    }

    /// Focus minutes of finished tasks per day, week or month around `anchor`.
    #[instrument(skip(self))]
    pub async fn distribution(
        &self,
        user_id: &str,
        period: &str,
        anchor: NaiveDate,
    ) -> Result<Distribution, AppError> {
        let period: Period = period
            .parse()
            .map_err(|UnknownPeriod(p)| AppError::InvalidPeriod(p))?;
        let buckets = canonical_buckets(period, anchor)
            .ok_or_else(|| AppError::InvalidDate(anchor.to_string()))?;

        let raw = self
            .tasks
            .sum_duration_grouped(user_id, buckets.range, period, true)
            .await
            .map_err(AppError::AggregationFailed)?;

        let distribution = complete_distribution(period, anchor, &buckets, raw);
        debug!(
            buckets = distribution.data.len(),
            total_minutes = distribution.total_minutes(),
            "Focus distribution computed"
        );
        Ok(distribution)
    }

    #[instrument(skip(self))]
    pub async fn today(&self, user_id: &str, day: NaiveDate) -> Result<FocusStats, AppError> {
        let totals = self
            .tasks
            .focus_totals(user_id, Some(DateRange::single_day(day)))
            .await?;

        Ok(FocusStats {
            focus_count: totals.finished_count,
            focus_duration_minutes: totals.duration_minutes,
            tasks_completed: totals.finished_count,
        })
    }

    #[instrument(skip(self))]
    pub async fn total(&self, user_id: &str) -> Result<TotalFocusStats, AppError> {
        let totals = self.tasks.focus_totals(user_id, None).await?;
        let avg_daily_duration = if totals.active_days > 0 {
            totals.duration_minutes / totals.active_days as i64
        } else {
            0
        };

        Ok(TotalFocusStats {
            focus_count: totals.finished_count,
            focus_duration_minutes: totals.duration_minutes,
            tasks_completed: totals.finished_count,
            avg_daily_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryTaskStore, StoreError};
    use crate::models::{
        focus::FocusTotals,
        task::{Pagination, Task, TaskInput, TaskQuery},
    };
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers grouped queries with fixed rows and counts how often it was asked.
    struct CannedTaskStore {
        rows: Vec<(String, i64)>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl CannedTaskStore {
        fn new(rows: Vec<(&str, i64)>) -> Self {
            Self {
                rows: rows.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(vec![])
            }
        }
    }

    #[async_trait]
    impl TaskStore for CannedTaskStore {
        async fn create(&self, _task: Task) -> Result<Task, StoreError> {
            unimplemented!()
        }
        async fn get(&self, _id: &str) -> Result<Task, StoreError> {
            unimplemented!()
        }
        async fn update(&self, _task: &Task) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn delete(&self, _id: &str) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn list(
            &self,
            _user_id: &str,
            _query: &TaskQuery,
            _page: Option<Pagination>,
        ) -> Result<(Vec<Task>, u64), StoreError> {
            unimplemented!()
        }
        async fn sum_duration_grouped(
            &self,
            _user_id: &str,
            _range: DateRange,
            _group_by: Period,
            _finished_only: bool,
        ) -> Result<Vec<(String, i64)>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StoreError::Timeout(std::time::Duration::from_secs(10)));
            }
            Ok(self.rows.clone())
        }
        async fn focus_totals(
            &self,
            _user_id: &str,
            _range: Option<DateRange>,
        ) -> Result<FocusTotals, StoreError> {
            unimplemented!()
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn empty_service() -> FocusService {
        FocusService::new(Arc::new(CannedTaskStore::new(vec![])))
    }

    #[tokio::test]
    async fn day_period_covers_every_day_of_the_month() {
        let dist = empty_service()
            .distribution("u1", "day", date(2025, 5, 15))
            .await
            .unwrap();

        assert_eq!(dist.period, Period::Day);
        assert_eq!(dist.data.len(), 31);
        assert_eq!(dist.data.keys().next().unwrap(), "2025-05-01");
        assert_eq!(dist.data.keys().last().unwrap(), "2025-05-31");
        assert!(dist.data.values().all(|v| *v == 0));
    }

    #[tokio::test]
    async fn day_period_handles_leap_february() {
        let dist = empty_service()
            .distribution("u1", "day", date(2024, 2, 10))
            .await
            .unwrap();
        assert_eq!(dist.data.len(), 29);
        assert!(dist.data.contains_key("2024-02-29"));
    }

    #[tokio::test]
    async fn week_period_uses_iso_week_count() {
        let dist = empty_service()
            .distribution("u1", "week", date(2025, 12, 31))
            .await
            .unwrap();
        let expected: Vec<String> = (1..=52).map(|w| format!("2025-W{:02}", w)).collect();
        assert_eq!(dist.data.keys().cloned().collect::<Vec<_>>(), expected);

        let dist = empty_service()
            .distribution("u1", "week", date(2026, 6, 1))
            .await
            .unwrap();
        assert_eq!(dist.data.len(), 53);
        assert!(dist.data.contains_key("2026-W53"));
    }

    #[tokio::test]
    async fn month_period_has_twelve_buckets() {
        let dist = empty_service()
            .distribution("u1", "month", date(2025, 7, 4))
            .await
            .unwrap();
        let expected: Vec<String> = (1..=12).map(|m| format!("2025-{:02}", m)).collect();
        assert_eq!(dist.data.keys().cloned().collect::<Vec<_>>(), expected);
    }

    #[tokio::test]
    async fn malformed_keys_fold_into_anchor_bucket() {
        let store = CannedTaskStore::new(vec![
            ("", 45),
            ("2025-05-03", 20),
            ("unknown", 5),
            ("2025-05-15", 10),
        ]);
        let service = FocusService::new(Arc::new(store));

        let dist = service
            .distribution("u1", "day", date(2025, 5, 15))
            .await
            .unwrap();

        assert_eq!(dist.data["2025-05-15"], 60);
        assert_eq!(dist.data["2025-05-03"], 20);
        assert_eq!(dist.data.len(), 31);
        assert_eq!(dist.total_minutes(), 45 + 20 + 5 + 10);
    }

    #[tokio::test]
    async fn out_of_range_keys_are_conserved() {
        let store = CannedTaskStore::new(vec![("2024-11", 30), ("2025-03", 15)]);
        let service = FocusService::new(Arc::new(store));

        let dist = service
            .distribution("u1", "month", date(2025, 8, 2))
            .await
            .unwrap();

        assert_eq!(dist.data.len(), 12);
        assert_eq!(dist.data["2025-08"], 30);
        assert_eq!(dist.data["2025-03"], 15);
        assert_eq!(dist.total_minutes(), 45);
    }

    #[test]
    fn oversized_sums_saturate_instead_of_overflowing() {
        let buckets = canonical_buckets(Period::Day, date(2025, 5, 15)).unwrap();
        let raw = vec![
            ("2025-05-15".to_string(), i64::MAX),
            ("2025-05-15".to_string(), i64::MAX),
            (String::new(), i64::MAX),
        ];

        let dist = complete_distribution(Period::Day, date(2025, 5, 15), &buckets, raw);
        assert_eq!(dist.data["2025-05-15"], i64::MAX);
        assert_eq!(dist.data.len(), 31);
    }

    #[test]
    fn anchor_week_is_clamped_into_anchor_year() {
        // 2027-01-01 is in ISO week 53 of 2026
        assert_eq!(anchor_key(Period::Week, date(2027, 1, 1)), "2027-W01");
        // 2025-12-31 is in ISO week 1 of 2026
        assert_eq!(anchor_key(Period::Week, date(2025, 12, 31)), "2025-W52");
        assert_eq!(anchor_key(Period::Week, date(2025, 5, 15)), "2025-W20");
    }

    #[test]
    fn week_range_spans_whole_iso_weeks() {
        let buckets = canonical_buckets(Period::Week, date(2025, 3, 1)).unwrap();
        assert_eq!(buckets.range, DateRange::days(date(2024, 12, 30), date(2025, 12, 29)));
    }

    #[test]
    fn key_shapes() {
        assert!(has_key_shape(Period::Day, "2025-05-01"));
        assert!(!has_key_shape(Period::Day, "2025/05/01"));
        assert!(!has_key_shape(Period::Day, ""));
        assert!(has_key_shape(Period::Week, "2025-W07"));
        assert!(!has_key_shape(Period::Week, "2025-07"));
        assert!(has_key_shape(Period::Month, "2025-07"));
        assert!(!has_key_shape(Period::Month, "2025-7"));
    }

    #[tokio::test]
    async fn unknown_period_fails_before_querying() {
        let store = Arc::new(CannedTaskStore::new(vec![]));
        let service = FocusService::new(store.clone());

        let err = service
            .distribution("u1", "year", date(2025, 5, 15))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidPeriod(p) if p == "year"));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn store_failure_is_an_aggregation_failure() {
        let service = FocusService::new(Arc::new(CannedTaskStore::failing()));
        let err = service
            .distribution("u1", "week", date(2025, 5, 15))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AggregationFailed(_)));
    }

    #[tokio::test]
    async fn finished_tasks_are_bucketed_by_iso_week() {
        let store = Arc::new(InMemoryTaskStore::new());
        let at = |m, d| Utc.with_ymd_and_hms(2025, m, d, 10, 0, 0).unwrap();
        for (when, minutes, finished) in [
            (at(1, 1), 25, true),  // Wednesday of 2025-W01
            (at(5, 15), 50, true), // 2025-W20
            (at(5, 16), 10, true), // 2025-W20
            (at(5, 16), 99, false),
        ] {
            let input = TaskInput {
                title: "focus".into(),
                time_range: String::new(),
                date: when,
                duration_minutes: minutes,
                is_important: false,
                description: String::new(),
                due_date: None,
                place: String::new(),
                category: String::new(),
            };
            let task = Task {
                is_finished: finished,
                ..Task::new("u1", input, Utc::now())
            };
            store.create(task).await.unwrap();
        }
        let service = FocusService::new(store);

        let dist = service
            .distribution("u1", "week", date(2025, 5, 15))
            .await
            .unwrap();
        assert_eq!(dist.data["2025-W01"], 25);
        assert_eq!(dist.data["2025-W20"], 60);
        assert_eq!(dist.total_minutes(), 85);

        let today = service.today("u1", date(2025, 5, 16)).await.unwrap();
        assert_eq!(today.focus_count, 1);
        assert_eq!(today.focus_duration_minutes, 10);

        let total = service.total("u1").await.unwrap();
        assert_eq!(total.tasks_completed, 3);
        assert_eq!(total.avg_daily_duration, 85 / 3);
    }
}
