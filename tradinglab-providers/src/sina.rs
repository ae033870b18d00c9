//! Sina Finance (新浪财经) adapter: JSON-P-style kline and snapshot endpoints.
//!
//! Unlike Eastmoney, Sina's kline rows already carry `amount`/`turnover`
//! style fields in share (not lot) units, so no volume conversion is
//! applied, mirroring the source system's `sina.py` (which only renames
//! columns and never multiplies `成交量`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tradinglab_core::{
    Exchange, FetcherError, OhlcvBar, Provider, StockBasicInfo, StockInfoFetcher,
};
use tradinglab_types::{Method, MethodSpec, ProviderKey};

use crate::common::{self, NetworkSettings};

const KLINE_URL: &str = "https://quotes.sina.cn/cn/api/json_v2.php/CN_MarketDataService.getKLineData";
const LIST_URL: &str = "https://vip.stock.finance.sina.com.cn/quotes_service/api/json_v2.php/Market_Center.getHQNodeData";

static METHOD_SPECS: &[(Method, MethodSpec)] = &[
    (
        Method::FetchStockDailyData,
        MethodSpec {
            weight: 1.0,
            qps: Some(20),
            concurrency: Some(3),
        },
    ),
    (
        Method::GetStockBasicInfo,
        MethodSpec {
            weight: 1.0,
            qps: Some(20),
            concurrency: Some(3),
        },
    ),
    (
        Method::GetAllStockBasicInfo,
        MethodSpec {
            weight: 1.0,
            qps: Some(20),
            concurrency: Some(3),
        },
    ),
];

/// The Sina Finance market-data source. Lower weight and tighter rate limits
/// than Eastmoney, matching the source system's more conservative
/// `register_method(weight=1.0, max_requests_per_minute=20, max_concurrent=3)`.
pub struct SinaProvider {
    net: NetworkSettings,
    healthy: AtomicBool,
}

impl SinaProvider {
    /// Build a provider with default network settings, starting out healthy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            net: NetworkSettings::new(),
            healthy: AtomicBool::new(true),
        }
    }

    fn sina_symbol(exchange: Exchange, symbol: &str) -> String {
        let prefix = match exchange {
            Exchange::SH => "sh",
            Exchange::SZ | Exchange::BJ => "sz",
        };
        format!("{prefix}{symbol}")
    }

    async fn fetch_kline(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<OhlcvBar>, FetcherError> {
        let exchange = common::infer_exchange(symbol)
            .ok_or_else(|| FetcherError::InvalidArg(format!("cannot infer exchange for {symbol}")))?;
        let client = self.net.client("sina")?;
        let resp = client
            .get(KLINE_URL)
            .query(&[
                ("symbol", Self::sina_symbol(exchange, symbol)),
                ("scale", "240".to_string()),
                ("ma", "no".to_string()),
                ("datalen", "1023".to_string()),
            ])
            .send()
            .await
            .map_err(|e| FetcherError::upstream("sina", e.to_string()))?;

        let rows: Vec<SinaKlineRow> = resp
            .json()
            .await
            .map_err(|e| FetcherError::upstream("sina", format!("malformed kline response: {e}")))?;

        rows.into_iter()
            .filter(|row| {
                NaiveDate::parse_from_str(&row.day, "%Y-%m-%d")
                    .map(|d| d >= start && d <= end)
                    .unwrap_or(false)
            })
            .map(|row| row.into_bar(symbol))
            .collect::<Result<Vec<_>, _>>()
    }
}

impl Default for SinaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct SinaKlineRow {
    day: String,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

impl SinaKlineRow {
    fn into_bar(self, symbol: &str) -> Result<OhlcvBar, FetcherError> {
        let malformed = |field: &str| FetcherError::SchemaViolation {
            reason: format!("sina: malformed '{field}' for {symbol} on {}", self.day),
        };
        let parse_dec = |s: &str, field: &str| -> Result<Decimal, FetcherError> {
            s.parse().map_err(|_| malformed(field))
        };

        let bar = OhlcvBar {
            timestamp: NaiveDate::parse_from_str(&self.day, "%Y-%m-%d").map_err(|_| malformed("day"))?,
            symbol: symbol.to_string(),
            open: parse_dec(&self.open, "open")?,
            high: parse_dec(&self.high, "high")?,
            low: parse_dec(&self.low, "low")?,
            close: parse_dec(&self.close, "close")?,
            volume: self
                .volume
                .parse::<f64>()
                .map_err(|_| malformed("volume"))? as u64,
            trading_value: None,
            amplitude: None,
            pct_change: None,
            price_change: None,
            turnover_rate: None,
        };
        bar.validate()?;
        Ok(bar)
    }
}

#[derive(Debug, Deserialize)]
struct SinaListEntry {
    symbol: String,
    name: String,
}

#[async_trait]
impl StockInfoFetcher for SinaProvider {
    async fn get_all_stock_basic_info(&self) -> Result<Vec<StockBasicInfo>, FetcherError> {
        let client = self.net.client("sina")?;
        let resp = client
            .get(LIST_URL)
            .query(&[
                ("page", "1"),
                ("num", "5000"),
                ("sort", "symbol"),
                ("asc", "1"),
                ("node", "hs_a"),
            ])
            .send()
            .await
            .map_err(|e| FetcherError::upstream("sina", e.to_string()))?;

        let rows: Vec<SinaListEntry> = resp
            .json()
            .await
            .map_err(|e| FetcherError::upstream("sina", format!("malformed list response: {e}")))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let code = row.symbol.trim_start_matches(|c: char| c.is_alphabetic());
                let exchange = common::infer_exchange(code)?;
                Some(StockBasicInfo {
                    section: common::classify_section(code).to_string(),
                    stock_type: Some("A股".to_string()),
                    name: row.name,
                    listing_date: None,
                    industry: None,
                    total_shares: None,
                    float_shares: None,
                    total_market_value: None,
                    float_market_value: None,
                    symbol: code.to_string(),
                    exchange,
                    last_update: Utc::now(),
                })
            })
            .collect())
    }

    async fn get_stock_basic_info(
        &self,
        exchange: Exchange,
        symbol: &str,
    ) -> Result<StockBasicInfo, FetcherError> {
        // Sina's snapshot endpoint carries no stable per-symbol detail fields
        // beyond name/price; basic-info enrichment (industry, share counts)
        // is left to Eastmoney, which the router fails over to when this
        // method is unregistered or unhealthy here.
        let all = self.get_all_stock_basic_info().await?;
        all.into_iter()
            .find(|info| info.symbol == symbol && info.exchange == exchange)
            .ok_or_else(|| FetcherError::not_found(format!("sina basic info for {symbol}")))
    }

    async fn fetch_stock_daily_data(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, FetcherError> {
        self.fetch_kline(symbol, start, end).await
    }
}

impl Provider for SinaProvider {
    fn key(&self) -> ProviderKey {
        ProviderKey::new("sina")
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    fn timeout(&self) -> Duration {
        self.net.timeout()
    }

    fn set_timeout(&self, timeout: Duration) {
        self.net.set_timeout(timeout);
    }

    fn proxy(&self) -> Option<String> {
        self.net.proxy()
    }

    fn set_proxy(&self, proxy: Option<String>) {
        self.net.set_proxy(proxy);
    }

    fn health_check<'a>(
        &'a self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            let today = chrono::Local::now().date_naive();
            self.fetch_kline("600000", today, today).await.is_ok()
        })
    }

    fn as_stock_info_fetcher(&self) -> Option<&dyn StockInfoFetcher> {
        Some(self as &dyn StockInfoFetcher)
    }

    fn method_specs(&self) -> &'static [(Method, MethodSpec)] {
        METHOD_SPECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sina_symbol_prefixes_shanghai_with_sh() {
        assert_eq!(SinaProvider::sina_symbol(Exchange::SH, "600000"), "sh600000");
    }

    #[test]
    fn sina_symbol_prefixes_shenzhen_with_sz() {
        assert_eq!(SinaProvider::sina_symbol(Exchange::SZ, "000001"), "sz000001");
    }

    #[test]
    fn kline_row_volume_is_not_scaled() {
        let row = SinaKlineRow {
            day: "2024-01-02".to_string(),
            open: "10.00".to_string(),
            high: "10.50".to_string(),
            low: "9.80".to_string(),
            close: "10.20".to_string(),
            volume: "100000".to_string(),
        };
        let bar = row.into_bar("600000").unwrap();
        assert_eq!(bar.volume, 100_000);
    }

    #[test]
    fn malformed_price_field_is_rejected() {
        let row = SinaKlineRow {
            day: "2024-01-02".to_string(),
            open: "not-a-number".to_string(),
            high: "10.50".to_string(),
            low: "9.80".to_string(),
            close: "10.20".to_string(),
            volume: "1000".to_string(),
        };
        assert!(row.into_bar("600000").is_err());
    }
}
