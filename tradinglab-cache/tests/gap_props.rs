use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use tradinglab_cache::gaps::{merge_into_ranges, missing_days, trading_days_in_range};

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (2020i32..2026i32, 1u32..=12u32, 1u32..=28u32)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

proptest! {
    /// `missing_days(required, cached)` only ever removes days, never adds
    /// or reorders the ones it keeps.
    #[test]
    fn missing_days_is_a_subsequence_of_required(
        start in arb_date(),
        span in 0i64..120i64,
        keep_every_nth in 1usize..5usize,
    ) {
        let end = start + Duration::days(span);
        let required = trading_days_in_range(start, end);
        let cached: BTreeSet<NaiveDate> = required
            .iter()
            .enumerate()
            .filter(|(i, _)| i % keep_every_nth != 0)
            .map(|(_, d)| *d)
            .collect();

        let missing = missing_days(&required, &cached);
        prop_assert!(missing.iter().all(|d| required.contains(d)));
        prop_assert!(missing.iter().all(|d| !cached.contains(d)));
        prop_assert!(missing.windows(2).all(|w| w[0] < w[1]));
    }

    /// Every day that goes into `merge_into_ranges` comes back out of some
    /// range, and no range spans a day that was never in the input.
    #[test]
    fn merge_into_ranges_covers_every_input_day_exactly_once(
        start in arb_date(),
        span in 0i64..120i64,
        keep_every_nth in 1usize..5usize,
    ) {
        let end = start + Duration::days(span);
        let required = trading_days_in_range(start, end);
        let days: Vec<NaiveDate> = required
            .iter()
            .enumerate()
            .filter(|(i, _)| i % keep_every_nth == 0)
            .map(|(_, d)| *d)
            .collect();

        let ranges = merge_into_ranges(&days);
        let mut covered: Vec<NaiveDate> = Vec::new();
        for (s, e) in &ranges {
            prop_assert!(s <= e);
            let mut d = *s;
            while d <= *e {
                covered.push(d);
                d += Duration::days(1);
            }
        }
        prop_assert_eq!(covered, days);
    }

    /// Ranges returned by `merge_into_ranges` never touch: consecutive
    /// ranges always have at least a one-day gap between them, or the input
    /// would have merged them into one.
    #[test]
    fn merged_ranges_never_abut(
        start in arb_date(),
        span in 0i64..120i64,
        keep_every_nth in 1usize..5usize,
    ) {
        let end = start + Duration::days(span);
        let required = trading_days_in_range(start, end);
        let days: Vec<NaiveDate> = required
            .iter()
            .enumerate()
            .filter(|(i, _)| i % keep_every_nth == 0)
            .map(|(_, d)| *d)
            .collect();

        let ranges = merge_into_ranges(&days);
        for pair in ranges.windows(2) {
            prop_assert!(pair[1].0 - pair[0].1 > Duration::days(1));
        }
    }
}
