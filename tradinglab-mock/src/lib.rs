//! tradinglab-mock: a deterministic, network-free `StockInfoFetcher`
//! provider for router, cache-service and scheduler tests.
//!
//! Mirrors the source system's fixture-backed mock connector: responses are
//! scripted per symbol rather than fetched, and a symbol can be told to fail
//! or stall so router failover, retry and timeout behavior can be exercised
//! without a network.
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tradinglab_core::{
    Exchange, FetcherError, OhlcvBar, Provider, StockBasicInfo, StockInfoFetcher,
};
use tradinglab_types::{Method, MethodSpec, ProviderKey};

/// Scripted behavior a [`MockProvider`] replays for a given symbol instead of
/// making a network call.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Respond with whatever fixture data is on file for the symbol.
    Ok,
    /// Fail every call for this symbol with an upstream error.
    Fail,
    /// Sleep for the given duration before responding, to exercise router
    /// per-attempt timeouts.
    Delay(Duration),
}

/// Builds a [`MockProvider`] with a fixed key and method specs. The spec
/// slice is leaked once at build time so `MockProvider` can satisfy
/// `Provider::method_specs`'s `&'static` signature while still letting each
/// test configure its own weight/qps/concurrency.
pub struct MockProviderBuilder {
    key: &'static str,
    weight: f64,
    qps: Option<u32>,
    concurrency: Option<usize>,
    methods: Vec<Method>,
    healthy: bool,
}

impl MockProviderBuilder {
    /// Start building a provider registered under `key`, implementing all
    /// three `StockInfoFetcher` methods with a weight of 1.0 and no QPS or
    /// concurrency ceiling.
    #[must_use]
    pub fn new(key: &'static str) -> Self {
        Self {
            key,
            weight: 1.0,
            qps: None,
            concurrency: None,
            methods: vec![
                Method::FetchStockDailyData,
                Method::GetAllStockBasicInfo,
                Method::GetStockBasicInfo,
            ],
            healthy: true,
        }
    }

    /// Override the weighted-selection weight applied to every method.
    #[must_use]
    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Apply a QPS ceiling to every method.
    #[must_use]
    pub fn qps(mut self, qps: u32) -> Self {
        self.qps = Some(qps);
        self
    }

    /// Apply a concurrency ceiling to every method.
    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Restrict which methods this provider advertises via `method_specs`.
    #[must_use]
    pub fn methods(mut self, methods: Vec<Method>) -> Self {
        self.methods = methods;
        self
    }

    /// Start the provider out unhealthy instead of the optimistic default.
    #[must_use]
    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Build the provider.
    #[must_use]
    pub fn build(self) -> MockProvider {
        let spec = MethodSpec {
            weight: self.weight,
            qps: self.qps,
            concurrency: self.concurrency,
        };
        let specs: Vec<(Method, MethodSpec)> =
            self.methods.into_iter().map(|m| (m, spec)).collect();
        MockProvider {
            key: ProviderKey::new(self.key),
            healthy: AtomicBool::new(self.healthy),
            health_check_result: AtomicBool::new(true),
            timeout: Mutex::new(Duration::from_secs(10)),
            proxy: Mutex::new(None),
            daily_bars: Mutex::new(HashMap::new()),
            basic_info: Mutex::new(HashMap::new()),
            behavior: Mutex::new(HashMap::new()),
            call_count: AtomicU64::new(0),
            specs: specs.leak(),
        }
    }
}

/// Deterministic, in-memory `StockInfoFetcher` implementation. Data and
/// per-symbol failure/delay scripting are configured via the setter methods
/// below; health and call counters are observable for assertions.
pub struct MockProvider {
    key: ProviderKey,
    healthy: AtomicBool,
    health_check_result: AtomicBool,
    timeout: Mutex<Duration>,
    proxy: Mutex<Option<String>>,
    daily_bars: Mutex<HashMap<String, Vec<OhlcvBar>>>,
    basic_info: Mutex<HashMap<String, StockBasicInfo>>,
    behavior: Mutex<HashMap<String, MockBehavior>>,
    call_count: AtomicU64,
    specs: &'static [(Method, MethodSpec)],
}

impl MockProvider {
    /// Start a builder for a provider registered under `key`.
    #[must_use]
    pub fn builder(key: &'static str) -> MockProviderBuilder {
        MockProviderBuilder::new(key)
    }

    /// Build a provider with default settings, registered under `key`.
    #[must_use]
    pub fn new(key: &'static str) -> Self {
        MockProviderBuilder::new(key).build()
    }

    /// Install the fixture returned by `fetch_stock_daily_data(symbol, ..)`.
    pub fn set_daily_bars(&self, symbol: &str, bars: Vec<OhlcvBar>) {
        self.daily_bars
            .lock()
            .expect("mutex poisoned")
            .insert(symbol.to_string(), bars);
    }

    /// Install the fixture returned by `get_stock_basic_info`/
    /// `get_all_stock_basic_info`.
    pub fn set_basic_info(&self, info: StockBasicInfo) {
        self.basic_info
            .lock()
            .expect("mutex poisoned")
            .insert(info.symbol.clone(), info);
    }

    /// Script `symbol` to fail, stall, or succeed on every subsequent call.
    pub fn set_behavior(&self, symbol: &str, behavior: MockBehavior) {
        self.behavior
            .lock()
            .expect("mutex poisoned")
            .insert(symbol.to_string(), behavior);
    }

    /// Shorthand for `set_behavior(symbol, MockBehavior::Fail)`.
    pub fn fail_calls_for(&self, symbol: &str) {
        self.set_behavior(symbol, MockBehavior::Fail);
    }

    /// What the next `health_check()` call will report.
    pub fn set_health_check_result(&self, healthy: bool) {
        self.health_check_result.store(healthy, Ordering::SeqCst);
    }

    /// Total calls made across all three methods, for asserting retry counts.
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    async fn apply_behavior(&self, symbol: &str) -> Result<(), FetcherError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .behavior
            .lock()
            .expect("mutex poisoned")
            .get(symbol)
            .cloned();
        match behavior {
            Some(MockBehavior::Fail) => Err(FetcherError::upstream(
                self.key.as_str(),
                format!("scripted failure for {symbol}"),
            )),
            Some(MockBehavior::Delay(d)) => {
                tokio::time::sleep(d).await;
                Ok(())
            }
            Some(MockBehavior::Ok) | None => Ok(()),
        }
    }
}

impl Provider for MockProvider {
    fn key(&self) -> ProviderKey {
        self.key
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    fn timeout(&self) -> Duration {
        *self.timeout.lock().expect("mutex poisoned")
    }

    fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock().expect("mutex poisoned") = timeout;
    }

    fn proxy(&self) -> Option<String> {
        self.proxy.lock().expect("mutex poisoned").clone()
    }

    fn set_proxy(&self, proxy: Option<String>) {
        *self.proxy.lock().expect("mutex poisoned") = proxy;
    }

    fn health_check<'a>(
        &'a self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            let result = self.health_check_result.load(Ordering::SeqCst);
            self.healthy.store(result, Ordering::SeqCst);
            result
        })
    }

    fn as_stock_info_fetcher(&self) -> Option<&dyn StockInfoFetcher> {
        Some(self as &dyn StockInfoFetcher)
    }

    fn method_specs(&self) -> &'static [(Method, MethodSpec)] {
        self.specs
    }
}

#[async_trait]
impl StockInfoFetcher for MockProvider {
    async fn get_all_stock_basic_info(&self) -> Result<Vec<StockBasicInfo>, FetcherError> {
        self.apply_behavior("*").await?;
        let mut all: Vec<StockBasicInfo> = self
            .basic_info
            .lock()
            .expect("mutex poisoned")
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(all)
    }

    async fn get_stock_basic_info(
        &self,
        _exchange: Exchange,
        symbol: &str,
    ) -> Result<StockBasicInfo, FetcherError> {
        self.apply_behavior(symbol).await?;
        self.basic_info
            .lock()
            .expect("mutex poisoned")
            .get(symbol)
            .cloned()
            .ok_or_else(|| FetcherError::not_found(format!("basic info for {symbol}")))
    }

    async fn fetch_stock_daily_data(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, FetcherError> {
        self.apply_behavior(symbol).await?;
        let bars = self
            .daily_bars
            .lock()
            .expect("mutex poisoned")
            .get(symbol)
            .cloned()
            .unwrap_or_default();
        Ok(bars
            .into_iter()
            .filter(|b| b.timestamp >= start && b.timestamp <= end)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str) -> OhlcvBar {
        OhlcvBar {
            timestamp: date.parse().unwrap(),
            symbol: "600000".to_string(),
            open: "10.0".parse().unwrap(),
            high: "10.5".parse().unwrap(),
            low: "9.8".parse().unwrap(),
            close: "10.2".parse().unwrap(),
            volume: 1000,
            trading_value: None,
            amplitude: None,
            pct_change: None,
            price_change: None,
            turnover_rate: None,
        }
    }

    #[tokio::test]
    async fn returns_configured_bars_within_range() {
        let provider = MockProvider::new("mock-a");
        provider.set_daily_bars(
            "600000",
            vec![bar("2024-01-02"), bar("2024-01-03"), bar("2024-01-04")],
        );
        let fetcher = provider.as_stock_info_fetcher().unwrap();
        let bars = fetcher
            .fetch_stock_daily_data(
                "600000",
                "2024-01-02".parse().unwrap(),
                "2024-01-03".parse().unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(bars.len(), 2);
    }

    #[tokio::test]
    async fn scripted_failure_returns_upstream_error() {
        let provider = MockProvider::new("mock-b");
        provider.fail_calls_for("600001");
        let fetcher = provider.as_stock_info_fetcher().unwrap();
        let err = fetcher
            .fetch_stock_daily_data(
                "600001",
                "2024-01-02".parse().unwrap(),
                "2024-01-03".parse().unwrap(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FetcherError::Upstream { .. }));
    }

    #[tokio::test]
    async fn missing_basic_info_is_not_found() {
        let provider = MockProvider::new("mock-c");
        let fetcher = provider.as_stock_info_fetcher().unwrap();
        let err = fetcher
            .get_stock_basic_info(Exchange::SH, "600000")
            .await
            .unwrap_err();
        assert!(matches!(err, FetcherError::NotFound { .. }));
    }

    #[test]
    fn method_specs_reflect_builder_weight() {
        let provider = MockProvider::builder("mock-d").weight(3.0).build();
        let specs = provider.method_specs();
        assert!(specs.iter().all(|(_, spec)| spec.weight == 3.0));
    }
}
