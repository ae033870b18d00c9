//! QPS token bucket and concurrency guard enforced, in that order, before
//! every provider call.
//!
//! Mirrors the source system's `rate_limited(limiter, semaphore)` decorator:
//! the QPS gate is checked first, then the concurrency semaphore is
//! acquired. Both must release on every exit path, including task
//! cancellation, which is why the concurrency permit is represented as an
//! RAII guard rather than an explicit release call.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::sleep;

/// Rolling-window QPS gate. `capacity` calls are allowed per `window`;
/// callers beyond that sleep until the window rolls over.
pub struct QpsLimiter {
    capacity: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

struct WindowState {
    count: u32,
    window_start: Instant,
}

impl QpsLimiter {
    /// Build a limiter allowing `capacity` calls per 60-second window.
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        Self::with_window(capacity, Duration::from_secs(60))
    }

    /// Build a limiter with an explicit window, primarily for tests.
    #[must_use]
    pub fn with_window(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            state: Mutex::new(WindowState {
                count: 0,
                window_start: Instant::now(),
            }),
        }
    }

    /// Block until a slot in the current (or a future) window is available.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().expect("mutex poisoned");
                let elapsed = state.window_start.elapsed();
                if elapsed >= self.window {
                    state.count = 0;
                    state.window_start = Instant::now();
                }
                if state.count < self.capacity {
                    state.count += 1;
                    None
                } else {
                    Some(self.window.saturating_sub(elapsed))
                }
            };
            match wait {
                None => return,
                Some(d) => sleep(d).await,
            }
        }
    }
}

/// Bounded-concurrency gate for one `(provider, method)` registration.
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
}

/// RAII permit released automatically on drop, including on cancellation of
/// the future awaiting it.
pub struct CallGuard {
    _permit: Option<OwnedSemaphorePermit>,
}

impl ConcurrencyLimiter {
    /// Build a limiter allowing up to `max_concurrent` in-flight calls.
    /// `None` means unlimited, represented as an effectively unbounded semaphore.
    #[must_use]
    pub fn new(max_concurrent: Option<usize>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.unwrap_or(Semaphore::MAX_PERMITS))),
        }
    }

    /// Acquire a permit, waiting if the limiter is currently saturated.
    ///
    /// # Panics
    /// Panics if the underlying semaphore has been closed, which never
    /// happens for a semaphore this type owns exclusively.
    pub async fn acquire(&self) -> CallGuard {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("semaphore never closed");
        CallGuard {
            _permit: Some(permit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn qps_limiter_allows_up_to_capacity_without_waiting() {
        let limiter = QpsLimiter::with_window(2, Duration::from_secs(60));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn concurrency_limiter_caps_in_flight_calls() {
        let limiter = ConcurrencyLimiter::new(Some(1));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let run = |limiter: &ConcurrencyLimiter| async {
            let _guard = limiter.acquire().await;
            let cur = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(cur, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
        };

        tokio::join!(run(&limiter), run(&limiter));
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permit_releases_on_cancellation() {
        let limiter = ConcurrencyLimiter::new(Some(1));
        let fut = async {
            let _guard = limiter.acquire().await;
            std::future::pending::<()>().await;
        };
        tokio::select! {
            () = fut => unreachable!(),
            () = sleep(Duration::from_millis(5)) => {}
        }
        // the aborted future's guard must have been dropped, freeing the permit
        let guard = limiter.acquire().await;
        drop(guard);
    }
}
