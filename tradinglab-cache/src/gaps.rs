//! Pure, allocation-only helpers for computing which trading days a query
//! range is missing from an already-cached set, grounded in the source
//! system's gap-detection logic (`stock_daily_service._get_missing_ranges`)
//! and the teacher's own timestamp-keyed merge (`borsa-core::timeseries::merge`).

use std::collections::BTreeSet;

use chrono::NaiveDate;
use tradinglab_core::is_trading_day;

/// Every trading day in the inclusive range `[start, end]`, ascending.
/// Empty if `start > end`.
#[must_use]
pub fn trading_days_in_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut d = start;
    while d <= end {
        if is_trading_day(d) {
            days.push(d);
        }
        d += chrono::Duration::days(1);
    }
    days
}

/// `required \ cached`, preserving `required`'s ascending order.
#[must_use]
pub fn missing_days(required: &[NaiveDate], cached: &BTreeSet<NaiveDate>) -> Vec<NaiveDate> {
    required.iter().copied().filter(|d| !cached.contains(d)).collect()
}

/// Merge consecutive calendar dates in `days` (must already be ascending,
/// as `missing_days` returns) into minimal closed ranges.
///
/// Two dates are "consecutive" here if they are adjacent calendar days, not
/// adjacent trading days — a Friday and the following Monday are never
/// merged into one range even though no trading day falls between them,
/// matching the source system's date-arithmetic grouping rather than a
/// trading-calendar-aware one.
#[must_use]
pub fn merge_into_ranges(days: &[NaiveDate]) -> Vec<(NaiveDate, NaiveDate)> {
    let mut ranges: Vec<(NaiveDate, NaiveDate)> = Vec::new();
    for &d in days {
        match ranges.last_mut() {
            Some((_, end)) if *end + chrono::Duration::days(1) == d => *end = d,
            _ => ranges.push((d, d)),
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn trading_days_prunes_weekend_and_holiday() {
        // 2024-01-01 is New Year's Day (holiday), 01-06/07 are Sat/Sun.
        let days = trading_days_in_range(d("2024-01-01"), d("2024-01-07"));
        assert_eq!(
            days,
            vec![d("2024-01-02"), d("2024-01-03"), d("2024-01-04"), d("2024-01-05")]
        );
    }

    #[test]
    fn missing_days_detects_single_hole() {
        let required = trading_days_in_range(d("2024-01-02"), d("2024-01-05"));
        let cached: BTreeSet<NaiveDate> =
            [d("2024-01-02"), d("2024-01-03"), d("2024-01-05")].into_iter().collect();
        assert_eq!(missing_days(&required, &cached), vec![d("2024-01-04")]);
    }

    #[test]
    fn missing_days_empty_when_fully_cached() {
        let required = trading_days_in_range(d("2024-01-02"), d("2024-01-05"));
        let cached: BTreeSet<NaiveDate> = required.iter().copied().collect();
        assert!(missing_days(&required, &cached).is_empty());
    }

    #[test]
    fn merge_groups_consecutive_calendar_days() {
        let days = vec![d("2024-01-02"), d("2024-01-03"), d("2024-01-05")];
        assert_eq!(
            merge_into_ranges(&days),
            vec![(d("2024-01-02"), d("2024-01-03")), (d("2024-01-05"), d("2024-01-05"))]
        );
    }

    #[test]
    fn merge_of_single_day_is_one_range() {
        assert_eq!(
            merge_into_ranges(&[d("2024-01-04")]),
            vec![(d("2024-01-04"), d("2024-01-04"))]
        );
    }

    #[test]
    fn merge_of_empty_is_empty() {
        assert!(merge_into_ranges(&[]).is_empty());
    }
}
