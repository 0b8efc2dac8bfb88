//! Calendar-aligned bucket boundaries and lookback ranges, all in UTC.
//!
//! Buckets are derived by truncating the reference instant to its unit and
//! stepping in whole calendar units, so month and year buckets follow the
//! calendar instead of a fixed duration.

use chrono::{DateTime, Days, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::error::{AggregationError, AggregationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Daily,
    Monthly,
    Yearly,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "daily",
            Interval::Monthly => "monthly",
            Interval::Yearly => "yearly",
        }
    }

    fn truncate(&self, date: NaiveDate) -> Option<NaiveDate> {
        use chrono::Datelike;

        match self {
            Interval::Daily => Some(date),
            Interval::Monthly => NaiveDate::from_ymd_opt(date.year(), date.month(), 1),
            Interval::Yearly => NaiveDate::from_ymd_opt(date.year(), 1, 1),
        }
    }

    fn back(&self, date: NaiveDate, units: u32) -> Option<NaiveDate> {
        match self {
            Interval::Daily => date.checked_sub_days(Days::new(units.into())),
            Interval::Monthly => date.checked_sub_months(Months::new(units)),
            Interval::Yearly => date.checked_sub_months(Months::new(units.checked_mul(12)?)),
        }
    }

    fn next(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Interval::Daily => date.checked_add_days(Days::new(1)),
            Interval::Monthly => date.checked_add_months(Months::new(1)),
            Interval::Yearly => date.checked_add_months(Months::new(12)),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Interval::Daily),
            "monthly" => Ok(Interval::Monthly),
            "yearly" => Ok(Interval::Yearly),
            other => Err(AggregationError::invalid(format!(
                "unsupported interval '{other}', expected daily, monthly or yearly"
            ))),
        }
    }
}

/// Half-open `[start, end)` interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeBucket {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Largest series [`buckets_for`] will build
pub const MAX_BUCKETS: usize = 1000;

/// `count` buckets of `interval`, oldest first, the last one containing
/// `reference`. `count` must lie in `1..=MAX_BUCKETS`.
pub fn buckets_for(
    interval: Interval,
    count: usize,
    reference: DateTime<Utc>,
) -> AggregationResult<Vec<TimeBucket>> {
    if count == 0 {
        return Err(AggregationError::invalid("bucket count must be at least 1"));
    }
    if count > MAX_BUCKETS {
        return Err(AggregationError::invalid(format!(
            "bucket count {count} exceeds the maximum of {MAX_BUCKETS}"
        )));
    }

    let out_of_range =
        || AggregationError::invalid(format!("{count} {interval} buckets exceed the calendar"));

    let steps = u32::try_from(count - 1).map_err(|_| out_of_range())?;
    let current = interval
        .truncate(reference.date_naive())
        .ok_or_else(out_of_range)?;
    let mut start = interval.back(current, steps).ok_or_else(out_of_range)?;

    let mut buckets = Vec::with_capacity(count);
    for _ in 0..count {
        let end = interval.next(start).ok_or_else(out_of_range)?;
        buckets.push(TimeBucket {
            start: midnight(start),
            end: midnight(end),
        });
        start = end;
    }

    Ok(buckets)
}

/// Lookback used by the top-records and new-value-count aggregates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Range {
    Last24Hours,
    #[default]
    Last7Days,
    Last30Days,
    Last6Months,
}

impl Range {
    pub fn as_str(&self) -> &'static str {
        match self {
            Range::Last24Hours => "last24hours",
            Range::Last7Days => "last7days",
            Range::Last30Days => "last30days",
            Range::Last6Months => "last6months",
        }
    }

    /// Inclusive start of the range ending at `reference`
    pub fn start(&self, reference: DateTime<Utc>) -> AggregationResult<DateTime<Utc>> {
        let today = reference.date_naive();
        let start = match self {
            Range::Last24Hours => {
                return reference
                    .checked_sub_signed(Duration::hours(24))
                    .ok_or_else(|| AggregationError::invalid("reference instant out of range"));
            }
            Range::Last7Days => today.checked_sub_days(Days::new(6)),
            Range::Last30Days => today.checked_sub_days(Days::new(29)),
            Range::Last6Months => Interval::Monthly
                .truncate(today)
                .and_then(|month| month.checked_sub_months(Months::new(5))),
        };

        start
            .map(midnight)
            .ok_or_else(|| AggregationError::invalid("reference instant out of range"))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Range {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "last24hours" => Ok(Range::Last24Hours),
            "last7days" => Ok(Range::Last7Days),
            "last30days" => Ok(Range::Last30Days),
            "last6months" => Ok(Range::Last6Months),
            other => Err(AggregationError::invalid(format!(
                "unsupported range '{other}', expected last24hours, last7days, last30days or last6months"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_fourteen_daily_buckets() {
        let reference = at(2024, 3, 5, 15);
        let buckets = buckets_for(Interval::Daily, 14, reference).unwrap();

        assert_eq!(buckets.len(), 14);
        assert_eq!(buckets[0].start, at(2024, 2, 21, 0));
        assert_eq!(buckets[13].start, at(2024, 3, 5, 0));
        assert_eq!(buckets[13].end, at(2024, 3, 6, 0));
        assert!(buckets[13].contains(reference));
    }

    #[test]
    fn test_monthly_buckets_follow_calendar() {
        let buckets = buckets_for(Interval::Monthly, 3, at(2024, 3, 31, 23)).unwrap();

        assert_eq!(buckets[0].start, at(2024, 1, 1, 0));
        assert_eq!(buckets[1].start, at(2024, 2, 1, 0));
        // leap February
        assert_eq!(buckets[1].end - buckets[1].start, Duration::days(29));
        assert_eq!(buckets[2].end, at(2024, 4, 1, 0));
    }

    #[test]
    fn test_yearly_buckets() {
        let buckets = buckets_for(Interval::Yearly, 2, at(2024, 6, 1, 0)).unwrap();
        assert_eq!(buckets[0].start, at(2023, 1, 1, 0));
        assert_eq!(buckets[1].start, at(2024, 1, 1, 0));
        assert_eq!(buckets[1].end, at(2025, 1, 1, 0));
    }

    #[test]
    fn test_rejects_bad_arguments() {
        assert!(matches!(
            buckets_for(Interval::Daily, 0, at(2024, 1, 1, 0)),
            Err(AggregationError::InvalidArgument(_))
        ));
        assert!(matches!(
            "hourly".parse::<Interval>(),
            Err(AggregationError::InvalidArgument(_))
        ));
        assert!(matches!(
            buckets_for(Interval::Yearly, 1_000_000, at(2024, 1, 1, 0)),
            Err(AggregationError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_bucket_count_is_capped() {
        let reference = at(2024, 1, 1, 0);
        assert_eq!(buckets_for(Interval::Daily, MAX_BUCKETS, reference).unwrap().len(), MAX_BUCKETS);
        assert!(matches!(
            buckets_for(Interval::Daily, MAX_BUCKETS + 1, reference),
            Err(AggregationError::InvalidArgument(_))
        ));
        assert!(matches!(
            buckets_for(Interval::Daily, 50_000_000, reference),
            Err(AggregationError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_range_start() {
        let reference = at(2024, 3, 5, 15);
        assert_eq!(Range::Last24Hours.start(reference).unwrap(), at(2024, 3, 4, 15));
        assert_eq!(Range::Last7Days.start(reference).unwrap(), at(2024, 2, 28, 0));
        assert_eq!(Range::Last30Days.start(reference).unwrap(), at(2024, 2, 5, 0));
        assert_eq!(Range::Last6Months.start(reference).unwrap(), at(2023, 10, 1, 0));
        assert_eq!("LAST7DAYS".parse::<Range>().unwrap(), Range::Last7Days);
    }

    proptest! {
        #[test]
        fn prop_buckets_tile_the_lookback(
            secs in 0i64..4_000_000_000,
            count in 1usize..60,
            kind in 0u8..3,
        ) {
            let interval = match kind {
                0 => Interval::Daily,
                1 => Interval::Monthly,
                _ => Interval::Yearly,
            };
            let reference = Utc.timestamp_opt(secs, 0).unwrap();
            let buckets = buckets_for(interval, count, reference).unwrap();

            prop_assert_eq!(buckets.len(), count);
            prop_assert!(buckets[count - 1].contains(reference));
            for bucket in &buckets {
                prop_assert!(bucket.start < bucket.end);
            }
            for pair in buckets.windows(2) {
                prop_assert_eq!(pair[0].end, pair[1].start);
            }
        }
    }
}
