//! Weighted-random provider selection (§4.2 "Selection algorithm").

use std::sync::Arc;

use rand::Rng;

use crate::registration::MethodRegistration;

/// One candidate's running-sum score, computed while holding the snapshot
/// that `select` draws against.
struct Scored {
    registration: Arc<MethodRegistration>,
    score: f64,
}

/// Pick one registration from `candidates` proportional to
/// `weight * success_rate / (1 + active_count)`.
///
/// Falls back to a uniform pick when every score is non-positive (§4.2 step
///3) — this also covers the all-zero-weight edge case flagged in §9 as a
/// possibly-buggy source behavior (negative weights are not validated
/// upstream; a negative weight here simply contributes nothing since scores
/// are clamped to be non-negative inputs to the sum).
///
/// Returns `None` if `candidates` is empty (callers map this to
/// `NoProviderAvailable`).
pub async fn select(candidates: &[Arc<MethodRegistration>]) -> Option<Arc<MethodRegistration>> {
    if candidates.is_empty() {
        return None;
    }
    if candidates.len() == 1 {
        return Some(Arc::clone(&candidates[0]));
    }

    let mut scored = Vec::with_capacity(candidates.len());
    let mut total = 0.0_f64;
    for reg in candidates {
        let success_rate = reg.success_rate().await;
        let active = reg.active_count().max(0) as f64;
        let raw = reg.weight() * success_rate / (1.0 + active);
        let score = raw.max(0.0);
        total += score;
        scored.push(Scored {
            registration: Arc::clone(reg),
            score,
        });
    }

    select_from_snapshot(&scored, total)
}

fn select_from_snapshot(scored: &[Scored], total: f64) -> Option<Arc<MethodRegistration>> {
    let mut rng = rand::rng();
    if total <= 0.0 {
        let idx = rng.random_range(0..scored.len());
        return Some(Arc::clone(&scored[idx].registration));
    }
    let draw = rng.random_range(0.0..total);
    let mut running = 0.0_f64;
    for entry in scored {
        running += entry.score;
        if draw < running {
            return Some(Arc::clone(&entry.registration));
        }
    }
    // Floating point rounding can leave `draw` fractionally past the last
    // cumulative sum; fall back to the last candidate rather than `None`.
    scored.last().map(|e| Arc::clone(&e.registration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradinglab_core::Provider;
    use tradinglab_types::{Method, MethodSpec, ProviderKey};

    struct StubProvider(&'static str);
    impl Provider for StubProvider {
        fn key(&self) -> ProviderKey {
            ProviderKey::new(self.0)
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

    fn registration(name: &'static str, weight: f64) -> Arc<MethodRegistration> {
        Arc::new(MethodRegistration::new(
            Arc::new(StubProvider(name)),
            Method::FetchStockDailyData,
            MethodSpec {
                weight,
                qps: None,
                concurrency: None,
            },
        ))
    }

    #[tokio::test]
    async fn single_candidate_is_always_picked() {
        let only = registration("solo", 1.0);
        let picked = select(std::slice::from_ref(&only)).await.unwrap();
        assert_eq!(picked.provider_key().as_str(), "solo");
    }

    #[tokio::test]
    async fn empty_candidate_set_yields_none() {
        let candidates: Vec<Arc<MethodRegistration>> = Vec::new();
        assert!(select(&candidates).await.is_none());
    }

    #[tokio::test]
    async fn weighted_selection_converges_to_score_ratio() {
        let a = registration("a", 3.0);
        let b = registration("b", 1.0);
        let candidates = vec![Arc::clone(&a), Arc::clone(&b)];

        let mut a_count = 0u32;
        let trials = 20_000;
        for _ in 0..trials {
            let picked = select(&candidates).await.unwrap();
            if picked.provider_key().as_str() == "a" {
                a_count += 1;
            }
        }
        let observed = f64::from(a_count) / f64::from(trials);
        // Expected ratio is 3/4 = 0.75; allow generous slack for a fixed trial count.
        assert!(
            (observed - 0.75).abs() < 0.03,
            "observed ratio {observed} too far from 0.75"
        );
    }

    #[tokio::test]
    async fn non_positive_total_score_falls_back_to_uniform_pick() {
        let a = registration("a", 0.0);
        let b = registration("b", 0.0);
        let candidates = vec![Arc::clone(&a), Arc::clone(&b)];
        let mut seen_a = false;
        let mut seen_b = false;
        for _ in 0..200 {
            match select(&candidates).await.unwrap().provider_key().as_str() {
                "a" => seen_a = true,
                "b" => seen_b = true,
                other => panic!("unexpected provider {other}"),
            }
        }
        assert!(seen_a && seen_b, "uniform fallback should hit both arms");
    }
}
