//! Canonical domain types shared by providers, the router, the cache service
//! and the repositories.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::FetcherError;

/// One OHLCV bar, normalized to the canonical schema every provider adapter
/// must produce.
///
/// Invariants (enforced by [`OhlcvBar::validate`], checked by providers
/// before returning and by the cache service before upserting):
/// `high >= max(open, close, low)` and `low <= min(open, close, high)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OhlcvBar {
    /// Trading date this bar covers.
    pub timestamp: NaiveDate,
    /// Exchange-qualified security code, e.g. `"600000"`.
    pub symbol: String,
    /// Opening price.
    pub open: Decimal,
    /// Highest traded price.
    pub high: Decimal,
    /// Lowest traded price.
    pub low: Decimal,
    /// Closing price.
    pub close: Decimal,
    /// Shares traded (already normalized from lots, if the upstream uses lots).
    pub volume: u64,
    /// Traded value in the quote currency (成交额), if supplied by the provider.
    pub trading_value: Option<Decimal>,
    /// Amplitude percentage (振幅), if supplied by the provider.
    pub amplitude: Option<Decimal>,
    /// Percentage change versus the prior close (涨跌幅), if supplied.
    pub pct_change: Option<Decimal>,
    /// Absolute change versus the prior close (涨跌额), if supplied.
    pub price_change: Option<Decimal>,
    /// Turnover rate percentage (换手率), if supplied.
    pub turnover_rate: Option<Decimal>,
}

impl OhlcvBar {
    /// Check the canonical price invariants, returning a
    /// [`FetcherError::SchemaViolation`] describing the first violation found.
    pub fn validate(&self) -> Result<(), FetcherError> {
        if self.open <= Decimal::ZERO
            || self.high <= Decimal::ZERO
            || self.low <= Decimal::ZERO
            || self.close <= Decimal::ZERO
        {
            return Err(FetcherError::SchemaViolation {
                reason: format!("{}: open/high/low/close must be positive", self.symbol),
            });
        }
        let max_ohc = self.open.max(self.close).max(self.low);
        if self.high < max_ohc {
            return Err(FetcherError::SchemaViolation {
                reason: format!(
                    "{} {}: high {} < max(open, close, low) {}",
                    self.symbol, self.timestamp, self.high, max_ohc
                ),
            });
        }
        let min_ohc = self.open.min(self.close).min(self.high);
        if self.low > min_ohc {
            return Err(FetcherError::SchemaViolation {
                reason: format!(
                    "{} {}: low {} > min(open, close, high) {}",
                    self.symbol, self.timestamp, self.low, min_ohc
                ),
            });
        }
        Ok(())
    }
}

/// Exchange a China A-share symbol is listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Exchange {
    /// Shanghai Stock Exchange.
    SH,
    /// Shenzhen Stock Exchange.
    SZ,
    /// Beijing Stock Exchange.
    BJ,
}

impl Exchange {
    /// Parse from the persisted two-letter code, as stored in `stock_basic_info.exchange`.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "SH" => Some(Self::SH),
            "SZ" => Some(Self::SZ),
            "BJ" => Some(Self::BJ),
            _ => None,
        }
    }

    /// The persisted two-letter code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SH => "SH",
            Self::SZ => "SZ",
            Self::BJ => "BJ",
        }
    }
}

/// Canonical stock basic-info record, keyed by `symbol`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockBasicInfo {
    /// Security code, primary key.
    pub symbol: String,
    /// Listing exchange.
    pub exchange: Exchange,
    /// Board/section, e.g. "主板", "创业板", "科创板".
    pub section: String,
    /// Security type, e.g. "A股".
    pub stock_type: Option<String>,
    /// Display name.
    pub name: String,
    /// Listing date, if known.
    pub listing_date: Option<NaiveDate>,
    /// Industry classification, if known.
    pub industry: Option<String>,
    /// Total share count.
    pub total_shares: Option<Decimal>,
    /// Free-floating share count.
    pub float_shares: Option<Decimal>,
    /// Total market capitalization.
    pub total_market_value: Option<Decimal>,
    /// Free-float market capitalization.
    pub float_market_value: Option<Decimal>,
    /// When this record was last written by an upsert.
    pub last_update: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open: &str, high: &str, low: &str, close: &str) -> OhlcvBar {
        OhlcvBar {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            symbol: "600000".to_string(),
            open: open.parse().unwrap(),
            high: high.parse().unwrap(),
            low: low.parse().unwrap(),
            close: close.parse().unwrap(),
            volume: 1000,
            trading_value: None,
            amplitude: None,
            pct_change: None,
            price_change: None,
            turnover_rate: None,
        }
    }

    #[test]
    fn valid_bar_passes() {
        assert!(bar("10.0", "10.5", "9.8", "10.2").validate().is_ok());
    }

    #[test]
    fn high_below_close_is_rejected() {
        assert!(bar("10.0", "10.1", "9.8", "10.5").validate().is_err());
    }

    #[test]
    fn low_above_open_is_rejected() {
        assert!(bar("10.0", "10.5", "10.1", "10.2").validate().is_err());
    }

    #[test]
    fn non_positive_price_is_rejected() {
        assert!(bar("0", "10.5", "9.8", "10.2").validate().is_err());
    }
}
