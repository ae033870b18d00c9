//! Lazy health tracking for one `(provider, method)` registration.
//!
//! Mirrors the source system's `StockDataSource` base class: a provider
//! carries a cached `is_healthy`/`last_check_time` pair, re-probed only when
//! stale (not polled on a background timer) so unhealthy-but-unused providers
//! cost nothing.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Cached health verdict for one provider, with lazy re-probe semantics.
pub struct HealthTracker {
    state: Mutex<State>,
    staleness: Duration,
}

struct State {
    healthy: bool,
    last_check: Option<Instant>,
}

impl HealthTracker {
    /// Create a tracker that starts out healthy (optimistic default, matching
    /// the source system) and re-probes after `staleness` has elapsed.
    #[must_use]
    pub fn new(staleness: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                healthy: true,
                last_check: None,
            }),
            staleness,
        }
    }

    /// Whether a probe should run before the next call: true when the
    /// cached verdict is unhealthy, or has never been checked, or is stale.
    #[must_use]
    pub fn needs_probe(&self) -> bool {
        let state = self.state.lock().expect("mutex poisoned");
        if !state.healthy {
            return true;
        }
        match state.last_check {
            None => true,
            Some(at) => at.elapsed() > self.staleness,
        }
    }

    /// Current cached verdict, without triggering a probe.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.state.lock().expect("mutex poisoned").healthy
    }

    /// Wall-clock time of the last probe or real call recorded, if any.
    #[must_use]
    pub fn last_check(&self) -> Option<Instant> {
        self.state.lock().expect("mutex poisoned").last_check
    }

    /// Record the outcome of a probe or a real call.
    pub fn record(&self, healthy: bool) {
        let mut state = self.state.lock().expect("mutex poisoned");
        state.healthy = healthy;
        state.last_check = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_healthy_and_needs_an_initial_probe() {
        let t = HealthTracker::new(Duration::from_secs(300));
        assert!(t.is_healthy());
        assert!(t.needs_probe());
    }

    #[test]
    fn fresh_healthy_verdict_does_not_need_a_probe() {
        let t = HealthTracker::new(Duration::from_secs(300));
        t.record(true);
        assert!(!t.needs_probe());
    }

    #[test]
    fn unhealthy_verdict_always_needs_a_probe() {
        let t = HealthTracker::new(Duration::from_secs(300));
        t.record(false);
        assert!(!t.is_healthy());
        assert!(t.needs_probe());
    }

    #[test]
    fn stale_healthy_verdict_needs_a_probe() {
        let t = HealthTracker::new(Duration::from_millis(1));
        t.record(true);
        std::thread::sleep(Duration::from_millis(5));
        assert!(t.needs_probe());
    }
}
