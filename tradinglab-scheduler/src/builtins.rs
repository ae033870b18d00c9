//! The two built-in refresh jobs (§4.6): `update_stock_basic_info` and
//! `update_stock_daily`. Each is a thin [`JobHandler`] factory; wiring them
//! into a [`crate::Scheduler`] with their prescribed cron expressions is the
//! caller's job (see the crate-level example in `lib.rs`).

use std::sync::Arc;

use chrono::Utc;
use tradinglab_cache::DailyBarCacheService;
use tradinglab_core::{Exchange, FetcherError};
use tradinglab_fetch::Router;
use tradinglab_repo::BasicInfoRepository;
use tradinglab_types::CallOptions;

#[cfg(feature = "tracing")]
use tracing::warn;

use crate::scheduler::JobHandler;

/// Cron trigger for [`update_stock_basic_info`]: daily at 00:00.
pub const UPDATE_STOCK_BASIC_INFO_CRON: &str = "0 0 * * *";
/// Cron trigger for [`update_stock_daily`]: 16:00 on weekdays.
pub const UPDATE_STOCK_DAILY_CRON: &str = "0 16 * * 1-5";

/// Build the `update_stock_basic_info` job: for every `(exchange, symbol)`
/// pair in `symbol_universe`, fetch fresh basic info through `router` and
/// upsert it into `basic_info_repo`.
///
/// `symbol_universe` is the "enumerated exchange lists" §4.6 refers to — an
/// external input (the full listed-symbol roster), supplied by the caller
/// rather than hardcoded here, consistent with §1 treating the real-world
/// symbol universe as outside the core's concern.
///
/// Per-symbol failures are logged and do not abort the remaining symbols;
/// the job as a whole only fails if every symbol failed.
#[must_use]
pub fn update_stock_basic_info(
    router: Router,
    basic_info_repo: Arc<dyn BasicInfoRepository>,
    symbol_universe: Vec<(Exchange, String)>,
) -> JobHandler {
    Arc::new(move || {
        let router = router.clone();
        let basic_info_repo = basic_info_repo.clone();
        let universe = symbol_universe.clone();
        Box::pin(async move {
            if universe.is_empty() {
                return Ok(());
            }
            let mut failures = 0usize;
            for (exchange, symbol) in &universe {
                match router.get_stock_basic_info(*exchange, symbol, CallOptions::default()).await {
                    Ok(info) => {
                        if let Err(_err) = basic_info_repo.upsert_one(&info).await {
                            return Err(_err);
                        }
                    }
                    Err(_err) => {
                        failures += 1;
                        #[cfg(feature = "tracing")]
                        warn!(symbol = %symbol, error = %_err, "basic info refresh failed for symbol");
                    }
                }
            }
            if failures == universe.len() {
                return Err(FetcherError::upstream(
                    "router",
                    format!("basic info refresh failed for all {failures} symbols"),
                ));
            }
            Ok(())
        })
    })
}

/// Build the `update_stock_daily` job: for every symbol known to
/// `basic_info_repo`, fetch (and cache) today's bar through `cache`.
///
/// Per-symbol failures are logged and do not abort the remaining symbols,
/// mirroring the cache service's own partial-result philosophy (§4.4).
#[must_use]
pub fn update_stock_daily(cache: Arc<DailyBarCacheService>, basic_info_repo: Arc<dyn BasicInfoRepository>) -> JobHandler {
    Arc::new(move || {
        let cache = cache.clone();
        let basic_info_repo = basic_info_repo.clone();
        Box::pin(async move {
            let symbols = basic_info_repo.list_symbols().await?;
            if symbols.is_empty() {
                return Ok(());
            }
            let today = Utc::now().date_naive();
            let mut failures = 0usize;
            for symbol in &symbols {
                if let Err(_err) = cache.get_daily(symbol, today, today).await {
                    failures += 1;
                    #[cfg(feature = "tracing")]
                    warn!(symbol = %symbol, error = %_err, "daily refresh failed for symbol");
                }
            }
            if failures == symbols.len() {
                return Err(FetcherError::upstream(
                    "cache-service",
                    format!("daily refresh failed for all {failures} symbols"),
                ));
            }
            Ok(())
        })
    })
}
