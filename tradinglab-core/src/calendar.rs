//! China A-share trading-day calendar.
//!
//! Grounded in the source system's `is_trading_day` helper (weekday check plus
//! a `chinese_calendar.is_holiday` lookup): exchanges are closed on weekends,
//! fixed national holidays, and the Spring Festival week, whose dates shift
//! every year with the lunar calendar and so cannot be computed, only looked
//! up.

use chrono::{Datelike, NaiveDate, Weekday};

/// One entry in [`HOLIDAYS`]: an inclusive `[start, end]` closed range.
struct HolidayRange {
    start: (i32, u32, u32),
    end: (i32, u32, u32),
}

/// Known China A-share market holidays, as inclusive closed date ranges.
///
/// Covers fixed national holidays (New Year's Day, Labour Day, National Day)
/// and the lunar-calendar holidays (Spring Festival, Qingming, Dragon Boat,
/// Mid-Autumn) for the years this table has been populated for. Years
/// outside this table fall back to a weekday-only check (see
/// [`is_trading_day`]): this is a known, documented gap rather than a silent
/// bug — holidays for a missing year will be misclassified as trading days.
const HOLIDAYS: &[HolidayRange] = &[
    // 2024
    HolidayRange { start: (2024, 1, 1), end: (2024, 1, 1) },
    HolidayRange { start: (2024, 2, 10), end: (2024, 2, 17) },
    HolidayRange { start: (2024, 4, 4), end: (2024, 4, 6) },
    HolidayRange { start: (2024, 5, 1), end: (2024, 5, 5) },
    HolidayRange { start: (2024, 6, 8), end: (2024, 6, 10) },
    HolidayRange { start: (2024, 9, 15), end: (2024, 9, 17) },
    HolidayRange { start: (2024, 10, 1), end: (2024, 10, 7) },
    // 2025
    HolidayRange { start: (2025, 1, 1), end: (2025, 1, 1) },
    HolidayRange { start: (2025, 1, 28), end: (2025, 2, 4) },
    HolidayRange { start: (2025, 4, 4), end: (2025, 4, 6) },
    HolidayRange { start: (2025, 5, 1), end: (2025, 5, 5) },
    HolidayRange { start: (2025, 5, 31), end: (2025, 6, 2) },
    HolidayRange { start: (2025, 10, 1), end: (2025, 10, 8) },
    // 2026
    HolidayRange { start: (2026, 1, 1), end: (2026, 1, 1) },
    HolidayRange { start: (2026, 2, 16), end: (2026, 2, 22) },
    HolidayRange { start: (2026, 4, 4), end: (2026, 4, 6) },
    HolidayRange { start: (2026, 5, 1), end: (2026, 5, 5) },
    HolidayRange { start: (2026, 6, 19), end: (2026, 6, 21) },
    HolidayRange { start: (2026, 9, 25), end: (2026, 9, 27) },
    HolidayRange { start: (2026, 10, 1), end: (2026, 10, 8) },
];

fn is_listed_holiday(d: NaiveDate) -> bool {
    HOLIDAYS.iter().any(|r| {
        let start = NaiveDate::from_ymd_opt(r.start.0, r.start.1, r.start.2).unwrap();
        let end = NaiveDate::from_ymd_opt(r.end.0, r.end.1, r.end.2).unwrap();
        d >= start && d <= end
    })
}

/// Lowest year [`HOLIDAYS`] has an entry for.
const fn min_tabulated_year() -> i32 {
    2024
}

/// Highest year [`HOLIDAYS`] has an entry for.
const fn max_tabulated_year() -> i32 {
    2026
}

/// Whether `d` is a China A-share trading day: not a weekend, and not a
/// tabulated market holiday.
///
/// For years outside `[`min_tabulated_year`, `max_tabulated_year`]` this
/// degrades to a weekday-only check, matching the documented limitation of
/// the holiday table rather than treating the gap as an error.
#[must_use]
pub fn is_trading_day(d: NaiveDate) -> bool {
    if matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    if d.year() < min_tabulated_year() || d.year() > max_tabulated_year() {
        return true;
    }
    !is_listed_holiday(d)
}
