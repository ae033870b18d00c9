//! `MethodRegistration`: the binding of one provider's implementation of a
//! `ServiceMethod`, its static weight/QPS/concurrency spec and its runtime
//! counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::Mutex as AsyncMutex;
use tradinglab_core::Provider;
use tradinglab_health::{ConcurrencyLimiter, QpsLimiter};
use tradinglab_types::{Method, MethodSpec, ProviderKey};

/// Exponential-moving-average smoothing factor applied to the success rate
/// on every completed call (see §9 EMA success-rate).
pub const EMA_ALPHA: f64 = 0.2;

/// Snapshot of one registration's counters, returned by [`MethodRegistration::stat`]
/// and aggregated into the router-wide `stat()` payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegistrationStat {
    /// Provider this registration binds.
    pub provider: ProviderKey,
    /// Method this registration implements.
    pub method: Method,
    /// Calls currently in flight.
    pub active: i64,
    /// Total calls dispatched (successful and failed).
    pub calls: u64,
    /// Total calls that failed after exhausting retries.
    pub errors: u64,
    /// EMA-smoothed success rate in `[0, 1]`.
    pub success_rate: f64,
    /// Declared weight used by the weighted-random selection step.
    pub weight: f64,
    /// QPS ceiling, if any.
    pub qps: Option<u32>,
    /// Concurrency ceiling, if any.
    pub concurrency: Option<usize>,
    /// Wall-clock time of the last dispatched call, if any.
    pub last_call_time: Option<Instant>,
}

/// One `(provider, method)` binding: static spec plus atomic runtime counters.
///
/// `active`, `calls` and `errors` are plain atomics (sequential consistency
/// is sufficient per §5); `success_rate` and `last_call_time` are guarded by
/// a single async mutex since the EMA update must read-then-write and an
/// uncontended `tokio::Mutex` is cheap and cancel-safe.
pub struct MethodRegistration {
    provider_key: ProviderKey,
    provider: Arc<dyn Provider>,
    method: Method,
    spec: MethodSpec,
    qps: Option<QpsLimiter>,
    concurrency: ConcurrencyLimiter,
    active: AtomicI64,
    calls: AtomicU64,
    errors: AtomicU64,
    outcome: AsyncMutex<OutcomeState>,
}

struct OutcomeState {
    success_rate: f64,
    last_call_time: Option<Instant>,
}

impl MethodRegistration {
    /// Build a fresh registration at provider-registration time. `success_rate`
    /// starts at 1.0 (optimistic default, matching a never-probed provider
    /// being treated as healthy on first routing attempt).
    #[must_use]
    pub fn new(provider: Arc<dyn Provider>, method: Method, spec: MethodSpec) -> Self {
        Self {
            provider_key: provider.key(),
            provider,
            method,
            spec,
            qps: spec.qps.map(QpsLimiter::new),
            concurrency: ConcurrencyLimiter::new(spec.concurrency),
            active: AtomicI64::new(0),
            calls: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            outcome: AsyncMutex::new(OutcomeState {
                success_rate: 1.0,
                last_call_time: None,
            }),
        }
    }

    /// Provider this registration is bound to.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Stable key of the bound provider.
    #[must_use]
    pub fn provider_key(&self) -> ProviderKey {
        self.provider_key
    }

    /// Method this registration implements.
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Declared weight, used by the weighted-random selection step.
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.spec.weight
    }

    /// Calls currently in flight.
    #[must_use]
    pub fn active_count(&self) -> i64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Current EMA-smoothed success rate, without blocking on in-flight updates.
    pub async fn success_rate(&self) -> f64 {
        self.outcome.lock().await.success_rate
    }

    /// Acquire the limiter (QPS, then concurrency, in that fixed order) and
    /// bump `active_count`, for the lifetime of one call (all retry attempts
    /// share a single acquisition — see §9's open question about
    /// per-attempt-vs-per-call token stability). The returned guard
    /// decrements `active_count` and releases the concurrency permit on
    /// drop, including on cancellation, so callers never need a separate
    /// cleanup path.
    ///
    /// `limiter_override`/`semaphore_override` come from a call site's
    /// [`tradinglab_types::CallOptions`]: when set, this call bypasses the
    /// registration's own ceiling entirely and is gated by a fresh, one-shot
    /// limiter/semaphore built just for this acquisition instead.
    pub async fn acquire(
        self: &Arc<Self>,
        limiter_override: Option<u32>,
        semaphore_override: Option<usize>,
    ) -> InFlightGuard {
        match limiter_override {
            Some(qps) => QpsLimiter::new(qps).acquire().await,
            None => {
                if let Some(qps) = &self.qps {
                    qps.acquire().await;
                }
            }
        }
        let permit = match semaphore_override {
            Some(limit) => ConcurrencyLimiter::new(Some(limit)).acquire().await,
            None => self.concurrency.acquire().await,
        };
        self.active.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            registration: Arc::clone(self),
            _permit: permit,
        }
    }

    /// Record the outcome of one completed (non-cancelled) call, after all
    /// retries: bumps `calls`/`errors`, updates the EMA and
    /// `last_call_time`. `active_count` is handled separately by
    /// [`InFlightGuard`] so this never needs to run on the cancellation path.
    pub async fn record_outcome(&self, success: bool) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !success {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
        let outcome = f64::from(u8::from(success));
        let mut state = self.outcome.lock().await;
        state.success_rate = (1.0 - EMA_ALPHA) * state.success_rate + EMA_ALPHA * outcome;
        state.last_call_time = Some(Instant::now());
    }

    /// Snapshot this registration's counters for `stat()`.
    pub async fn stat(&self) -> RegistrationStat {
        let state = self.outcome.lock().await;
        RegistrationStat {
            provider: self.provider_key,
            method: self.method,
            active: self.active_count(),
            calls: self.calls.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
            success_rate: state.success_rate,
            weight: self.spec.weight,
            qps: self.spec.qps,
            concurrency: self.spec.concurrency,
            last_call_time: state.last_call_time,
        }
    }
}

/// RAII handle for one in-flight call: decrements `active_count` and
/// releases the concurrency permit on drop, regardless of whether the call
/// succeeded, failed, or was cancelled mid-flight. Carries no knowledge of
/// the call's outcome — `record_outcome` is a separate, explicit step taken
/// only on the non-cancelled completion path.
pub struct InFlightGuard {
    registration: Arc<MethodRegistration>,
    _permit: tradinglab_health::CallGuard,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registration.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider;
    impl Provider for StubProvider {
        fn key(&self) -> ProviderKey {
            ProviderKey::new("stub")
        }
        fn is_healthy(&self) -> bool {
            true
        }
        fn set_healthy(&self, _: bool) {}
        fn health_check<'a>(
            &'a self,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + 'a>> {
            Box::pin(async { true })
        }
    }

    #[tokio::test]
    async fn success_rate_never_leaves_unit_interval() {
        let reg = Arc::new(MethodRegistration::new(
            Arc::new(StubProvider),
            Method::FetchStockDailyData,
            MethodSpec::default(),
        ));
        for i in 0..50 {
            reg.record_outcome(i % 3 != 0).await;
            let rate = reg.success_rate().await;
            assert!((0.0..=1.0).contains(&rate), "rate {rate} out of bounds");
        }
    }

    #[tokio::test]
    async fn active_count_never_negative_after_balanced_acquire_finish() {
        let reg = Arc::new(MethodRegistration::new(
            Arc::new(StubProvider),
            Method::FetchStockDailyData,
            MethodSpec::default(),
        ));
        let guard = reg.acquire(None, None).await;
        assert_eq!(reg.active_count(), 1);
        drop(guard);
        reg.record_outcome(true).await;
        assert_eq!(reg.active_count(), 0);
    }

    #[tokio::test]
    async fn dropping_guard_without_recording_still_releases_active_slot() {
        let reg = Arc::new(MethodRegistration::new(
            Arc::new(StubProvider),
            Method::FetchStockDailyData,
            MethodSpec::default(),
        ));
        let before = reg.success_rate().await;
        let guard = reg.acquire(None, None).await;
        drop(guard);
        assert_eq!(reg.active_count(), 0);
        assert_eq!(reg.success_rate().await, before);
    }
}
