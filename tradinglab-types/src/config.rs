//! Configuration types shared across the router, cache service and scheduler.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff-with-jitter configuration for the router's retry loop.
///
/// Defaults match the source system: an initial delay of 0.2s, doubling on
/// each attempt, capped at 2.0s, with 20% jitter applied to each delay.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Upper bound any single delay may reach.
    pub cap: Duration,
    /// Multiplicative factor applied to the delay after each failed attempt.
    pub factor: f64,
    /// Jitter percentage in `[0, 100]` applied on top of the computed delay.
    pub jitter_percent: u8,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(200),
            cap: Duration::from_secs(2),
            factor: 2.0,
            jitter_percent: 20,
        }
    }
}

/// Per-registration retry policy, per-attempt timeout and health-probe cadence.
///
/// Each `(provider, method)` registration is governed by one of these; the
/// QPS/concurrency ceilings live on [`MethodSpec`] since they are declared
/// per-registration rather than globally.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RouterConfig {
    /// Number of attempts (including the first) before giving up. Default 10.
    pub retries: u32,
    /// Backoff curve applied between attempts.
    pub backoff: BackoffConfig,
    /// Per-attempt timeout applied to the provider call.
    pub provider_timeout: Duration,
    /// How long a health verdict stays valid before the router re-probes.
    pub health_staleness: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            retries: 10,
            backoff: BackoffConfig::default(),
            provider_timeout: Duration::from_secs(10),
            health_staleness: Duration::from_secs(300),
        }
    }
}

/// Weight, QPS ceiling and concurrency ceiling for one `(provider, method)`
/// registration, as declared at provider-registration time.
///
/// This is the static half of a `MethodRegistration`: the counters
/// (`active_count`, `call_count`, `error_count`, `success_rate`,
/// `last_call_time`) are runtime state owned by `tradinglab-fetch` and are not
/// part of this value type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MethodSpec {
    /// Relative weight used by the weighted-random selection step.
    pub weight: f64,
    /// Token-bucket capacity per 60s window. `None` means unlimited.
    pub qps: Option<u32>,
    /// Concurrency semaphore size. `None` means unlimited.
    pub concurrency: Option<usize>,
}

impl Default for MethodSpec {
    fn default() -> Self {
        Self {
            weight: 1.0,
            qps: None,
            concurrency: None,
        }
    }
}

/// Per-call override accepted by a bound protocol proxy, short-circuiting the
/// registration defaults for that one call only.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CallOptions {
    /// Override the per-attempt timeout.
    pub timeout: Option<Duration>,
    /// Override the retry count.
    pub retries: Option<u32>,
    /// Override the registration's QPS ceiling for this call only. `None`
    /// keeps the registration's own limiter; `Some` bypasses it entirely and
    /// applies a fresh one-shot ceiling instead.
    pub limiter: Option<u32>,
    /// Override the registration's concurrency ceiling for this call only,
    /// with the same bypass semantics as `limiter`.
    pub semaphore: Option<usize>,
}

/// Scheduler lifecycle tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Grace period for a missed fire (e.g. due to process downtime) to still run.
    pub misfire_grace: Duration,
    /// IANA timezone name the scheduler's cron triggers are evaluated in.
    pub timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            misfire_grace: Duration::from_secs(30),
            timezone: "Asia/Shanghai".to_string(),
        }
    }
}
