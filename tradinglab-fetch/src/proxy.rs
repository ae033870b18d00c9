//! `StockInfoFetcherProxy`: `Router::bind::<StockInfoFetcher>()` (§4.2) — a
//! concrete type implementing the protocol trait so call sites never see the
//! registry or the selection/retry machinery underneath.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tradinglab_core::{Exchange, FetcherError, OhlcvBar, StockBasicInfo, StockInfoFetcher};
use tradinglab_types::CallOptions;

use crate::router::Router;

/// A `StockInfoFetcher` backed by a [`Router`], with per-call override
/// support via [`StockInfoFetcherProxy::with_options`].
///
/// This is what application code actually holds: it satisfies the same
/// trait object a single hand-written adapter would, so swapping a direct
/// adapter for a load-balanced, retrying, multi-provider router is a
/// construction-site change only.
#[derive(Clone)]
pub struct StockInfoFetcherProxy {
    router: Arc<Router>,
    options: CallOptions,
}

impl StockInfoFetcherProxy {
    /// Bind a proxy to `router` using registration defaults for every call.
    #[must_use]
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            options: CallOptions::default(),
        }
    }

    /// Return a copy of this proxy that short-circuits the registration
    /// defaults with `options` for every call it makes, per-field: an
    /// unset field in `options` still falls back to the registration
    /// default, not to this proxy's prior override.
    #[must_use]
    pub fn with_options(&self, options: CallOptions) -> Self {
        Self {
            router: Arc::clone(&self.router),
            options,
        }
    }

    /// The router backing this proxy.
    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }
}

#[async_trait]
impl StockInfoFetcher for StockInfoFetcherProxy {
    async fn get_all_stock_basic_info(&self) -> Result<Vec<StockBasicInfo>, FetcherError> {
        self.router.get_all_stock_basic_info(self.options).await
    }

    async fn get_stock_basic_info(
        &self,
        exchange: Exchange,
        symbol: &str,
    ) -> Result<StockBasicInfo, FetcherError> {
        self.router
            .get_stock_basic_info(exchange, symbol, self.options)
            .await
    }

    async fn fetch_stock_daily_data(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, FetcherError> {
        self.router
            .fetch_stock_daily_data(symbol, start, end, self.options)
            .await
    }
}
