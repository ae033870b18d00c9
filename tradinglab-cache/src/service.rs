//! [`DailyBarCacheService`]: the gap-aware daily-bar cache (§4.4).

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tradinglab_core::{FetcherError, OhlcvBar};
use tradinglab_fetch::Router;
use tradinglab_repo::{BasicInfoRepository, DailyBarRepository};
use tradinglab_types::CallOptions;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

use crate::gaps;

/// Returns all canonical bars for `symbol` in `[start, end]`, fetching only
/// the trading-day ranges the repository does not already cover.
///
/// Holds a `Router` (cheaply cloneable) and `Arc<dyn ...Repository>` handles
/// rather than owning the repositories outright, mirroring §3's "the cache
/// service borrows a short-lived repository handle per call" ownership note.
pub struct DailyBarCacheService {
    router: Router,
    daily_repo: Arc<dyn DailyBarRepository>,
    basic_info_repo: Arc<dyn BasicInfoRepository>,
}

impl DailyBarCacheService {
    /// Build a cache service dispatching gap fetches through `router` and
    /// persisting/querying through the given repositories.
    #[must_use]
    pub fn new(
        router: Router,
        daily_repo: Arc<dyn DailyBarRepository>,
        basic_info_repo: Arc<dyn BasicInfoRepository>,
    ) -> Self {
        Self {
            router,
            daily_repo,
            basic_info_repo,
        }
    }

    /// Return every canonical bar for `symbol` covering `[start, end]`
    /// inclusive, fetching and persisting only the missing trading days.
    ///
    /// # Errors
    /// Propagates [`FetcherError::Repository`] from the cache store (fatal).
    /// Upstream fetch failures for an individual missing range are logged
    /// and that range is silently dropped from the result (§4.4 "Failure
    /// semantics").
    pub async fn get_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, FetcherError> {
        let listing_date = self
            .basic_info_repo
            .get(symbol)
            .await?
            .and_then(|info| info.listing_date);
        let effective_start = listing_date.map_or(start, |l| start.max(l));
        if effective_start > end {
            return Ok(Vec::new());
        }

        let cached = self.daily_repo.list_for_symbol(symbol, effective_start, end).await?;
        let mut merged: BTreeMap<NaiveDate, OhlcvBar> =
            cached.into_iter().map(|b| (b.timestamp, b)).collect();

        let required = gaps::trading_days_in_range(effective_start, end);
        let missing = gaps::missing_days(&required, &merged.keys().copied().collect());

        if !missing.is_empty() {
            let ranges = gaps::merge_into_ranges(&missing);
            #[cfg(feature = "tracing")]
            debug!(symbol, ranges = ranges.len(), "fetching missing trading-day ranges");

            let fetches = ranges.into_iter().map(|(s, e)| {
                let router = self.router.clone();
                let symbol = symbol.to_string();
                async move { (s, e, router.fetch_stock_daily_data(&symbol, s, e, CallOptions::default()).await) }
            });
            let results = futures::future::join_all(fetches).await;

            let mut fetched_any = false;
            for (s, e, result) in results {
                match result {
                    Ok(bars) => {
                        for bar in bars {
                            if let Err(_err) = bar.validate() {
                                #[cfg(feature = "tracing")]
                                warn!(symbol, date = %bar.timestamp, error = %_err, "dropping schema-invalid bar");
                                continue;
                            }
                            fetched_any = true;
                            merged.entry(bar.timestamp).or_insert(bar);
                        }
                    }
                    Err(_err) => {
                        #[cfg(feature = "tracing")]
                        warn!(symbol, start = %s, end = %e, error = %_err, "dropping failed range, returning partial result");
                    }
                }
            }

            if fetched_any {
                let rows: Vec<OhlcvBar> = merged.values().cloned().collect();
                self.daily_repo.upsert_many(&rows).await?;
            }
        }

        Ok(merged
            .into_values()
            .filter(|b| b.timestamp >= effective_start && b.timestamp <= end)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use sqlx::SqlitePool;
    use tradinglab_core::{Exchange, Provider, StockBasicInfo};
    use tradinglab_fetch::Registry;
    use tradinglab_mock::MockProvider;
    use tradinglab_repo::{SqliteBasicInfoRepository, SqliteDailyBarRepository};
    use tradinglab_types::RouterConfig;

    fn bar(symbol: &str, date: &str) -> OhlcvBar {
        OhlcvBar {
            timestamp: date.parse().unwrap(),
            symbol: symbol.to_string(),
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

    async fn setup() -> (
        DailyBarCacheService,
        Arc<SqliteDailyBarRepository>,
        Arc<SqliteBasicInfoRepository>,
        Arc<MockProvider>,
    ) {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        let daily = Arc::new(SqliteDailyBarRepository::new(pool.clone()));
        daily.ensure_schema().await.unwrap();
        let basic = Arc::new(SqliteBasicInfoRepository::new(pool));
        basic.ensure_schema().await.unwrap();

        let provider = Arc::new(MockProvider::new("mock"));
        provider.set_daily_bars(
            "600000",
            vec![
                bar("600000", "2024-01-02"),
                bar("600000", "2024-01-03"),
                bar("600000", "2024-01-04"),
                bar("600000", "2024-01-05"),
            ],
        );
        let config = RouterConfig::default();
        let registry =
            Registry::from_providers(vec![provider.clone() as Arc<dyn Provider>], &config).unwrap();
        let router = Router::new(Arc::new(registry), config);

        let service = DailyBarCacheService::new(router, daily.clone(), basic.clone());
        (service, daily, basic, provider)
    }

    /// S1: cold cache, full range fetched in one shot.
    #[tokio::test]
    async fn cold_cache_fetches_full_range_once() {
        let (service, daily, _basic, provider) = setup().await;
        let bars = service
            .get_daily("600000", "2024-01-02".parse().unwrap(), "2024-01-05".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(bars.len(), 4);
        assert_eq!(provider.call_count(), 1);

        let persisted = daily
            .list_for_symbol("600000", "2024-01-01".parse().unwrap(), "2024-01-08".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(persisted.len(), 4);
    }

    /// S2: warm cache, identical repeat call issues zero upstream fetches.
    #[tokio::test]
    async fn warm_cache_issues_no_upstream_fetch() {
        let (service, _daily, _basic, provider) = setup().await;
        service
            .get_daily("600000", "2024-01-02".parse().unwrap(), "2024-01-05".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(provider.call_count(), 1);

        let bars = service
            .get_daily("600000", "2024-01-02".parse().unwrap(), "2024-01-05".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(bars.len(), 4);
        assert_eq!(provider.call_count(), 1, "second call must not hit upstream");
    }

    /// S3: a single hole in the middle of an otherwise-cached range triggers
    /// exactly one narrow upstream fetch.
    #[tokio::test]
    async fn hole_in_cache_fetches_only_the_gap() {
        let (service, daily, _basic, provider) = setup().await;
        daily.upsert_many(&[
            bar("600000", "2024-01-02"),
            bar("600000", "2024-01-03"),
            bar("600000", "2024-01-05"),
        ])
        .await
        .unwrap();

        let bars = service
            .get_daily("600000", "2024-01-02".parse().unwrap(), "2024-01-05".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(bars.len(), 4);
        assert_eq!(provider.call_count(), 1);
        assert!(bars.iter().any(|b| b.timestamp == "2024-01-04".parse().unwrap()));
    }

    /// S4: weekend/holiday pruning keeps the required set to actual trading days.
    #[tokio::test]
    async fn holiday_and_weekend_pruning_limits_required_days() {
        let (service, _daily, _basic, _provider) = setup().await;
        let bars = service
            .get_daily("600000", "2024-01-01".parse().unwrap(), "2024-01-07".parse().unwrap())
            .await
            .unwrap();
        assert!(bars.len() <= 4);
    }

    /// Effective-range clamping: a query fully before the listing date
    /// returns empty without error or upstream fetch.
    #[tokio::test]
    async fn pre_listing_query_returns_empty() {
        let (service, _daily, basic, provider) = setup().await;
        basic
            .upsert_one(&StockBasicInfo {
                symbol: "600000".to_string(),
                exchange: Exchange::SH,
                section: "主板".to_string(),
                stock_type: None,
                name: "Example".to_string(),
                listing_date: Some("2024-02-01".parse().unwrap()),
                industry: None,
                total_shares: None,
                float_shares: None,
                total_market_value: None,
                float_market_value: None,
                last_update: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let bars = service
            .get_daily("600000", "2024-01-02".parse().unwrap(), "2024-01-05".parse().unwrap())
            .await
            .unwrap();
        assert!(bars.is_empty());
        assert_eq!(provider.call_count(), 0);
    }
}
