//! Eastmoney (东方财富) adapter: push2 JSON endpoints for daily K-line data,
//! the market-wide security list and per-symbol detail.

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

const KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";
const LIST_URL: &str = "https://push2.eastmoney.com/api/qt/clist/get";
const DETAIL_URL: &str = "https://push2.eastmoney.com/api/qt/stock/get";

static METHOD_SPECS: &[(Method, MethodSpec)] = &[
    (
        Method::FetchStockDailyData,
        MethodSpec {
            weight: 1.2,
            qps: Some(30),
            concurrency: Some(5),
        },
    ),
    (
        Method::GetStockBasicInfo,
        MethodSpec {
            weight: 1.2,
            qps: Some(30),
            concurrency: Some(5),
        },
    ),
    (
        Method::GetAllStockBasicInfo,
        MethodSpec {
            weight: 1.2,
            qps: Some(30),
            concurrency: Some(5),
        },
    ),
];

/// The Eastmoney market-data source. Weight and rate limits mirror the
/// original's `register_method(weight=1.2, max_requests_per_minute=30,
/// max_concurrent=5)` decorator, applied uniformly across all three methods.
pub struct EastmoneyProvider {
    net: NetworkSettings,
    healthy: AtomicBool,
}

impl EastmoneyProvider {
    /// Build a provider with default network settings, starting out healthy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            net: NetworkSettings::new(),
            healthy: AtomicBool::new(true),
        }
    }

    fn secid(exchange: Exchange, symbol: &str) -> String {
        // push2's `secid` market codes: 1 = Shanghai, 0 = everything else
        // (Shenzhen and Beijing both resolve correctly against push2 with 0).
        let market = if exchange == Exchange::SH { 1 } else { 0 };
        format!("{market}.{symbol}")
    }

    async fn fetch_kline(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<OhlcvBar>, FetcherError> {
        let exchange = common::infer_exchange(symbol)
            .ok_or_else(|| FetcherError::InvalidArg(format!("cannot infer exchange for {symbol}")))?;
        let client = self.net.client("eastmoney")?;
        let resp = client
            .get(KLINE_URL)
            .query(&[
                ("secid", Self::secid(exchange, symbol)),
                ("klt", "101".to_string()),
                ("fqt", "1".to_string()),
                ("beg", start.format("%Y%m%d").to_string()),
                ("end", end.format("%Y%m%d").to_string()),
                (
                    "fields1",
                    "f1,f2,f3,f4,f5,f6".to_string(),
                ),
                (
                    "fields2",
                    "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61".to_string(),
                ),
            ])
            .send()
            .await
            .map_err(|e| FetcherError::upstream("eastmoney", e.to_string()))?;

        let body: KlineResponse = resp
            .json()
            .await
            .map_err(|e| FetcherError::upstream("eastmoney", format!("malformed kline response: {e}")))?;

        let Some(data) = body.data else {
            return Ok(Vec::new());
        };

        data.klines
            .iter()
            .map(|line| parse_kline_line(line, symbol))
            .collect::<Result<Vec<_>, _>>()
    }
}

impl Default for EastmoneyProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct KlineResponse {
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    klines: Vec<String>,
}

/// Parse one comma-separated push2 kline row:
/// `date,open,close,high,low,volume,amount,amplitude,pct_change,price_change,turnover_rate`.
///
/// `volume` arrives in 手 (lots of 100 shares) and is normalized to shares,
/// mirroring the original's `df['成交量'] = df['成交量'] * 100`.
fn parse_kline_line(line: &str, symbol: &str) -> Result<OhlcvBar, FetcherError> {
    let fields: Vec<&str> = line.split(',').collect();
    let malformed = || FetcherError::SchemaViolation {
        reason: format!("eastmoney: malformed kline row for {symbol}: {line}"),
    };
    if fields.len() < 11 {
        return Err(malformed());
    }
    let parse_dec = |s: &str| -> Result<Decimal, FetcherError> { s.parse().map_err(|_| malformed()) };

    let bar = OhlcvBar {
        timestamp: NaiveDate::parse_from_str(fields[0], "%Y-%m-%d").map_err(|_| malformed())?,
        symbol: symbol.to_string(),
        open: parse_dec(fields[1])?,
        close: parse_dec(fields[2])?,
        high: parse_dec(fields[3])?,
        low: parse_dec(fields[4])?,
        volume: fields[5]
            .parse::<u64>()
            .map_err(|_| malformed())?
            .saturating_mul(100),
        trading_value: parse_dec(fields[6]).ok(),
        amplitude: parse_dec(fields[7]).ok(),
        pct_change: parse_dec(fields[8]).ok(),
        price_change: parse_dec(fields[9]).ok(),
        turnover_rate: parse_dec(fields[10]).ok(),
    };
    bar.validate()?;
    Ok(bar)
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    data: Option<ListData>,
}

#[derive(Debug, Deserialize)]
struct ListData {
    diff: Vec<ListEntry>,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    /// Security code, e.g. `"600000"`.
    f12: String,
    /// Display name.
    f14: String,
    /// Market id: `1` Shanghai, `0` Shenzhen/Beijing.
    f13: i32,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    data: Option<DetailData>,
}

#[derive(Debug, Deserialize, Default)]
struct DetailData {
    /// Display name (股票简称).
    #[serde(rename = "f58")]
    name: Option<String>,
    /// Industry classification (所属行业).
    #[serde(rename = "f127")]
    industry: Option<String>,
    /// Total share count (总股本).
    #[serde(rename = "f84")]
    total_shares: Option<f64>,
    /// Free-floating share count (流通股).
    #[serde(rename = "f85")]
    float_shares: Option<f64>,
    /// Total market value (总市值).
    #[serde(rename = "f116")]
    total_market_value: Option<f64>,
    /// Free-float market value (流通市值).
    #[serde(rename = "f117")]
    float_market_value: Option<f64>,
}

#[async_trait]
impl StockInfoFetcher for EastmoneyProvider {
    async fn get_all_stock_basic_info(&self) -> Result<Vec<StockBasicInfo>, FetcherError> {
        let client = self.net.client("eastmoney")?;
        let resp = client
            .get(LIST_URL)
            .query(&[
                ("pn", "1"),
                ("pz", "6000"),
                ("po", "1"),
                ("np", "1"),
                ("fltt", "2"),
                ("invt", "2"),
                ("fs", "m:0 t:6,m:0 t:80,m:1 t:2,m:1 t:23,m:0 t:81 s:2048"),
                ("fields", "f12,f13,f14"),
            ])
            .send()
            .await
            .map_err(|e| FetcherError::upstream("eastmoney", e.to_string()))?;

        let body: ListResponse = resp
            .json()
            .await
            .map_err(|e| FetcherError::upstream("eastmoney", format!("malformed list response: {e}")))?;

        let Some(data) = body.data else {
            return Ok(Vec::new());
        };

        Ok(data
            .diff
            .into_iter()
            .map(|entry| StockBasicInfo {
                exchange: if entry.f13 == 1 {
                    Exchange::SH
                } else {
                    common::infer_exchange(&entry.f12).unwrap_or(Exchange::SZ)
                },
                section: common::classify_section(&entry.f12).to_string(),
                stock_type: Some("A股".to_string()),
                name: entry.f14,
                listing_date: None,
                industry: None,
                total_shares: None,
                float_shares: None,
                total_market_value: None,
                float_market_value: None,
                symbol: entry.f12,
                last_update: Utc::now(),
            })
            .collect())
    }

    async fn get_stock_basic_info(
        &self,
        exchange: Exchange,
        symbol: &str,
    ) -> Result<StockBasicInfo, FetcherError> {
        let client = self.net.client("eastmoney")?;
        let resp = client
            .get(DETAIL_URL)
            .query(&[
                ("secid", Self::secid(exchange, symbol)),
                (
                    "fields",
                    "f57,f58,f127,f84,f85,f116,f117".to_string(),
                ),
            ])
            .send()
            .await
            .map_err(|e| FetcherError::upstream("eastmoney", e.to_string()))?;

        let body: DetailResponse = resp
            .json()
            .await
            .map_err(|e| FetcherError::upstream("eastmoney", format!("malformed detail response: {e}")))?;

        let detail = body
            .data
            .ok_or_else(|| FetcherError::not_found(format!("eastmoney detail for {symbol}")))?;

        Ok(StockBasicInfo {
            symbol: symbol.to_string(),
            exchange,
            section: common::classify_section(symbol).to_string(),
            stock_type: Some("A股".to_string()),
            name: detail.name.clone().unwrap_or_default(),
            listing_date: None,
            industry: detail.industry,
            total_shares: detail.total_shares.and_then(Decimal::from_f64_retain),
            float_shares: detail.float_shares.and_then(Decimal::from_f64_retain),
            total_market_value: detail.total_market_value.and_then(Decimal::from_f64_retain),
            float_market_value: detail.float_market_value.and_then(Decimal::from_f64_retain),
            last_update: Utc::now(),
        })
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

impl Provider for EastmoneyProvider {
    fn key(&self) -> ProviderKey {
        ProviderKey::new("eastmoney")
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
            let today = chrono_today();
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

fn chrono_today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
