//! `Router`: dispatches one logical method call across the registrations a
//! [`Registry`] has accumulated for it, enforcing health, rate/concurrency
//! limits and retry-with-backoff (§4.2).

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;

use chrono::NaiveDate;
use tradinglab_core::{Exchange, FetcherError, OhlcvBar, StockBasicInfo, StockInfoFetcher};
use tradinglab_types::{CallOptions, Method, ProviderKey, RouterConfig};

use crate::backoff;
use crate::registry::Registry;
use crate::selection;
use crate::stat::{ProviderStat, RouterStat};

#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

/// A boxed, `Send` future, used for the type-erased per-method closures
/// `dispatch` accepts.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Dispatcher over a [`Registry`]. Cheaply cloneable (wraps an `Arc<Registry>`
/// plus a `Copy` config), so a single `Router` is typically shared across an
/// application via `Arc<Router>` or by cloning.
#[derive(Clone)]
pub struct Router {
    registry: Arc<Registry>,
    config: RouterConfig,
}

impl Router {
    /// Build a router over `registry`, using `config` for retry/backoff/health
    /// defaults whenever a call site does not override them via [`CallOptions`].
    #[must_use]
    pub fn new(registry: Arc<Registry>, config: RouterConfig) -> Self {
        Self { registry, config }
    }

    /// The registry this router dispatches over.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Fetch daily OHLCV bars for `symbol` covering `[start, end]` inclusive.
    ///
    /// # Errors
    /// Returns [`FetcherError::NoProviderAvailable`] if no healthy provider
    /// implements `fetch_stock_daily_data`, or
    /// [`FetcherError::RetriesExhausted`] if every attempt against the
    /// selected provider failed.
    pub async fn fetch_stock_daily_data(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        options: CallOptions,
    ) -> Result<Vec<OhlcvBar>, FetcherError> {
        let symbol = symbol.to_string();
        self.dispatch(Method::FetchStockDailyData, options, move |fetcher| {
            let symbol = symbol.clone();
            Box::pin(async move { fetcher.fetch_stock_daily_data(&symbol, start, end).await })
        })
        .await
    }

    /// Fetch basic info for one exchange-qualified symbol.
    ///
    /// # Errors
    /// See [`Router::fetch_stock_daily_data`].
    pub async fn get_stock_basic_info(
        &self,
        exchange: Exchange,
        symbol: &str,
        options: CallOptions,
    ) -> Result<StockBasicInfo, FetcherError> {
        let symbol = symbol.to_string();
        self.dispatch(Method::GetStockBasicInfo, options, move |fetcher| {
            let symbol = symbol.clone();
            Box::pin(async move { fetcher.get_stock_basic_info(exchange, &symbol).await })
        })
        .await
    }

    /// Fetch the full basic-info universe available from the selected provider.
    ///
    /// # Errors
    /// See [`Router::fetch_stock_daily_data`].
    pub async fn get_all_stock_basic_info(
        &self,
        options: CallOptions,
    ) -> Result<Vec<StockBasicInfo>, FetcherError> {
        self.dispatch(Method::GetAllStockBasicInfo, options, move |fetcher| {
            Box::pin(async move { fetcher.get_all_stock_basic_info().await })
        })
        .await
    }

    /// Observability snapshot: per-provider health, per-registration counters.
    pub async fn stat(&self) -> RouterStat {
        let mut providers = Vec::new();
        for provider in self.registry.providers() {
            let key = provider.key();
            let tracker = self.registry.health_tracker(key);
            providers.push(ProviderStat {
                provider: key,
                healthy: provider.is_healthy(),
                last_check: tracker.and_then(|t| t.last_check()),
            });
        }

        let mut registrations = Vec::new();
        for method in self.registry.known_methods() {
            for reg in self.registry.registrations(method) {
                registrations.push(reg.stat().await);
            }
        }

        RouterStat {
            providers,
            registrations,
        }
    }

    /// Core selection + health + rate-limit + retry dispatch shared by every
    /// protocol method. `call` is invoked against the `StockInfoFetcher` the
    /// selected registration's provider exposes.
    async fn dispatch<T, F>(
        &self,
        method: Method,
        options: CallOptions,
        call: F,
    ) -> Result<T, FetcherError>
    where
        T: Send,
        F: for<'a> Fn(&'a dyn StockInfoFetcher) -> BoxFuture<'a, Result<T, FetcherError>>
            + Send
            + Sync,
    {
        let registrations = self.registry.registrations(method);
        if registrations.is_empty() {
            return Err(FetcherError::NoProviderAvailable {
                method: method.to_string(),
            });
        }

        self.run_health_protocol(&registrations).await;

        let healthy: Vec<_> = registrations
            .into_iter()
            .filter(|r| r.provider().is_healthy())
            .collect();

        let Some(registration) = selection::select(&healthy).await else {
            return Err(FetcherError::NoProviderAvailable {
                method: method.to_string(),
            });
        };

        let provider_key = registration.provider_key();
        let retries = options.retries.unwrap_or(self.config.retries).max(1);
        let per_attempt_timeout = options.timeout.unwrap_or(self.config.provider_timeout);

        let guard = registration
            .acquire(options.limiter, options.semaphore)
            .await;

        let fetcher = registration
            .provider()
            .as_stock_info_fetcher()
            .ok_or_else(|| FetcherError::Internal(format!("{provider_key} has no StockInfoFetcher")))?;

        let mut last_err: Option<FetcherError> = None;
        for attempt in 0..retries {
            let attempt_result =
                tokio::time::timeout(per_attempt_timeout, call(fetcher)).await;
            let outcome = match attempt_result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(FetcherError::Timeout {
                    provider: provider_key.to_string(),
                    elapsed: per_attempt_timeout,
                }),
            };

            match outcome {
                Ok(value) => {
                    registration.record_outcome(true).await;
                    drop(guard);
                    return Ok(value);
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    warn!(provider = %provider_key, %method, attempt, "provider call failed");
                    last_err = Some(e);
                    if attempt + 1 < retries {
                        let delay = backoff::compute_delay(&self.config.backoff, attempt);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        registration.record_outcome(false).await;
        if let Some(tracker) = self.registry.health_tracker(provider_key) {
            tracker.record(false);
        }
        registration.provider().set_healthy(false);
        drop(guard);

        #[cfg(feature = "tracing")]
        tracing::error!(provider = %provider_key, %method, "exhausted retries, marking unhealthy");

        Err(FetcherError::RetriesExhausted {
            method: method.to_string(),
            attempts: retries,
            last: Box::new(last_err.unwrap_or_else(|| FetcherError::Internal(
                "retry loop exhausted with no recorded error".to_string(),
            ))),
        })
    }

    /// Lazily re-probe every distinct provider among `registrations` whose
    /// cached health verdict is unhealthy or has gone stale (§4.2 "Health
    /// protocol"). Probes run sequentially; they are cheap, infrequent
    /// (bounded by `health_staleness`), and this keeps the function free of
    /// extra concurrency primitives.
    async fn run_health_protocol(
        &self,
        registrations: &[Arc<crate::registration::MethodRegistration>],
    ) {
        let mut probed: HashSet<ProviderKey> = HashSet::new();
        for registration in registrations {
            let key = registration.provider_key();
            if !probed.insert(key) {
                continue;
            }
            let Some(tracker) = self.registry.health_tracker(key) else {
                continue;
            };
            if !tracker.needs_probe() {
                continue;
            }
            let provider = registration.provider();
            #[cfg(feature = "tracing")]
            debug!(provider = %key, "health verdict stale, re-probing");
            let healthy = provider.health_check().await;
            tracker.record(healthy);
            provider.set_healthy(healthy);
            #[cfg(feature = "tracing")]
            if healthy {
                info!(provider = %key, "health probe succeeded");
            }
        }
    }
}
