use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use tradinglab_core::OhlcvBar;

fn arb_price() -> impl Strategy<Value = Decimal> {
    (100i64..1_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn bar(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> OhlcvBar {
    OhlcvBar {
        timestamp: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        symbol: "600000".to_string(),
        open,
        high,
        low,
        close,
        volume: 1000,
        trading_value: None,
        amplitude: None,
        pct_change: None,
        price_change: None,
        turnover_rate: None,
    }
}

proptest! {
    /// `high = max(open, close)` and `low = min(open, close)` always
    /// validates, for any pair of positive open/close prices.
    #[test]
    fn tight_envelope_always_validates(open in arb_price(), close in arb_price()) {
        let high = open.max(close);
        let low = open.min(close);
        prop_assert!(bar(open, high, low, close).validate().is_ok());
    }

    /// Shrinking `high` below `max(open, close)` is always rejected, no
    /// matter how the shrink amount is chosen.
    #[test]
    fn high_below_envelope_is_always_rejected(
        open in arb_price(),
        close in arb_price(),
        shrink in 1i64..99i64,
    ) {
        let true_high = open.max(close);
        let low = open.min(close);
        let broken_high = true_high - Decimal::new(shrink, 2);
        prop_assume!(broken_high > Decimal::ZERO);
        prop_assert!(bar(open, broken_high, low, close).validate().is_err());
    }

    /// Raising `low` above `min(open, close)` is always rejected.
    #[test]
    fn low_above_envelope_is_always_rejected(
        open in arb_price(),
        close in arb_price(),
        raise in 1i64..99i64,
    ) {
        let high = open.max(close);
        let true_low = open.min(close);
        let broken_low = true_low + Decimal::new(raise, 2);
        prop_assume!(broken_low < high);
        prop_assert!(bar(open, high, broken_low, close).validate().is_err());
    }
}
