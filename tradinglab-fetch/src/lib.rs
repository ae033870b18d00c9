//! tradinglab-fetch: the provider registry and router.
//!
//! Overview
//! - `Registry` owns every registered `Provider` and the `MethodRegistration`s
//!   each logical `Method` resolves to.
//! - `Router` dispatches one call: health protocol, weighted-random selection,
//!   QPS/concurrency acquisition, retry-with-backoff, and failure-driven
//!   health demotion.
//! - `StockInfoFetcherProxy` is the concrete `StockInfoFetcher` application
//!   code holds; it delegates every call to a `Router` and accepts per-call
//!   `CallOptions` overrides.
//!
//! Key behaviors and trade-offs
//! - Selection: `score = weight * success_rate / (1 + active_count)`,
//!   weighted-random draw; falls back to a uniform pick when every score is
//!   non-positive.
//! - Retry: one provider is selected per call and all retry attempts run
//!   against that same registration (a single `InFlightGuard` spans the
//!   whole call), not re-selected per attempt.
//! - Health: lazily re-probed when the cached verdict is unhealthy or has
//!   gone stale, never polled on a background timer.
//! - Cancellation: dropping a call in flight still releases its limiter
//!   permit and decrements `active_count`; it never updates `success_rate`.
#![warn(missing_docs)]

mod backoff;
mod proxy;
mod registration;
mod registry;
mod router;
mod selection;
mod stat;

pub use proxy::StockInfoFetcherProxy;
pub use registration::{MethodRegistration, RegistrationStat};
pub use registry::Registry;
pub use router::{BoxFuture, Router};
pub use stat::{ProviderStat, RouterStat};
