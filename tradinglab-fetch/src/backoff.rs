//! Exponential-backoff-with-jitter delay computation for the retry loop.

use std::time::Duration;

use rand::Rng;
use tradinglab_types::BackoffConfig;

/// Compute the delay before retry attempt `attempt` (0-based: the delay
/// before the *first* retry, i.e. after the first failed attempt, is
/// `attempt = 0`).
///
/// `delay = min(cap, initial * factor^attempt)`, then jittered by up to
/// `jitter_percent` in either direction and clamped back into `[0, cap]`.
#[must_use]
pub fn compute_delay(config: &BackoffConfig, attempt: u32) -> Duration {
    let base_secs = config.initial.as_secs_f64() * config.factor.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
    let capped_secs = base_secs.min(config.cap.as_secs_f64());
    let jitter_frac = f64::from(config.jitter_percent) / 100.0;
    let mut rng = rand::rng();
    let jitter = rng.random_range(-jitter_frac..=jitter_frac);
    let jittered_secs = (capped_secs * (1.0 + jitter)).clamp(0.0, config.cap.as_secs_f64());
    Duration::from_secs_f64(jittered_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_never_exceeds_cap() {
        let config = BackoffConfig::default();
        for attempt in 0..20 {
            let d = compute_delay(&config, attempt);
            assert!(d <= config.cap, "attempt {attempt} produced {d:?} > cap");
        }
    }

    #[test]
    fn delay_grows_with_attempt_before_hitting_cap() {
        let config = BackoffConfig {
            jitter_percent: 0,
            ..BackoffConfig::default()
        };
        let d0 = compute_delay(&config, 0);
        let d1 = compute_delay(&config, 1);
        assert!(d1 >= d0);
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let config = BackoffConfig {
            jitter_percent: 0,
            ..BackoffConfig::default()
        };
        assert_eq!(compute_delay(&config, 0), config.initial);
    }
}
