//! The `Provider` base interface and the `StockInfoFetcher` protocol every
//! data-source adapter implements.

use async_trait::async_trait;
use chrono::NaiveDate;
use tradinglab_types::{Method, MethodSpec, ProviderKey};

use crate::error::FetcherError;
use crate::types::{OhlcvBar, StockBasicInfo};

/// Common adapter surface every registered data source implements, mirroring
/// the source system's abstract base class: a stable key, a health flag with
/// a last-check timestamp, a request timeout and an optional outbound proxy.
///
/// `Provider` is object-safe; the registry stores `Arc<dyn Provider>` and
/// downcasts to the protocol trait(s) the provider advertises via
/// [`Provider::as_stock_info_fetcher`].
pub trait Provider: Send + Sync {
    /// Process-stable identifier used for registration, logging and stats.
    fn key(&self) -> ProviderKey;

    /// Whether the last health probe (or last real call) found this provider healthy.
    fn is_healthy(&self) -> bool;

    /// Record the outcome of a health probe or real call.
    fn set_healthy(&self, healthy: bool);

    /// Request timeout this provider should be called with. Defaults to 10s,
    /// matching the source system's base adapter; providers may shorten or
    /// lengthen it to match upstream characteristics.
    fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(10)
    }

    /// Override the request timeout after construction, mirroring the
    /// source system's `StockDataSource.set_timeout`. No-op by default;
    /// adapters that want this to stick store the timeout behind interior
    /// mutability and override both this and [`Provider::timeout`].
    fn set_timeout(&self, _timeout: std::time::Duration) {}

    /// Outbound proxy URL this provider is currently configured with, if any.
    fn proxy(&self) -> Option<String> {
        None
    }

    /// Override the outbound proxy after construction, mirroring the source
    /// system's `StockDataSource.set_proxy`. No-op by default.
    fn set_proxy(&self, _proxy: Option<String>) {}

    /// Active out-of-band health probe. Called by the router when the cached
    /// health verdict has gone stale (see `RouterConfig::health_staleness`).
    fn health_check<'a>(
        &'a self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + 'a>>;

    /// Downcast to the `StockInfoFetcher` protocol, if this provider implements it.
    fn as_stock_info_fetcher(&self) -> Option<&dyn StockInfoFetcher> {
        None
    }

    /// The `(method, weight/qps/concurrency)` pairs this provider was
    /// annotated with at adapter-definition time, mirroring the source
    /// system's decorator-style `register_method`. The registry walks this
    /// slice at registration time to materialize one `MethodRegistration`
    /// per entry; a provider with no entries implements no dispatchable
    /// method (e.g. it only serves as a health-check target in tests).
    fn method_specs(&self) -> &'static [(Method, MethodSpec)] {
        &[]
    }
}

/// The protocol every market-data adapter implements: basic-info lookups and
/// daily-bar history. Method set and signatures mirror the source system's
/// `StockInfoFetcher` protocol, with `fetch_stock_daily_data` standardized to
/// take a plain symbol (the source had a call-site/interface mismatch between
/// a `StockBasicInfo`-typed parameter and a bare `code` argument).
#[async_trait]
pub trait StockInfoFetcher: Send + Sync {
    /// Fetch the full basic-info universe available from this source.
    async fn get_all_stock_basic_info(&self) -> Result<Vec<StockBasicInfo>, FetcherError>;

    /// Fetch basic info for one exchange-qualified symbol.
    async fn get_stock_basic_info(
        &self,
        exchange: crate::types::Exchange,
        symbol: &str,
    ) -> Result<StockBasicInfo, FetcherError>;

    /// Fetch daily OHLCV bars for `symbol` covering `[start, end]` inclusive.
    async fn fetch_stock_daily_data(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, FetcherError>;
}
