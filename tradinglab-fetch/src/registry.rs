//! The `Registry`: owns every registered `Provider` and the `ServiceMethod`
//! (ordered set of `MethodRegistration`s) each logical method resolves to.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use tradinglab_core::{FetcherError, Provider};
use tradinglab_health::HealthTracker;
use tradinglab_types::{Method, ProviderKey, RouterConfig};

use crate::registration::MethodRegistration;

struct ProviderEntry {
    provider: Arc<dyn Provider>,
    health: Arc<HealthTracker>,
}

/// Owns providers and method registrations; threaded explicitly into
/// `Router` construction rather than a process-wide singleton (§9 "Global
/// registry").
pub struct Registry {
    providers: RwLock<HashMap<ProviderKey, ProviderEntry>>,
    methods: RwLock<HashMap<Method, Vec<Arc<MethodRegistration>>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Build an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            methods: RwLock::new(HashMap::new()),
        }
    }

    /// Build a registry pre-populated from an init list, mirroring the
    /// source's eagerly-constructed global registry without the static
    /// side effects (§9 "prefer an explicit Registry value... a
    /// `NewDefaultRegistry()` helper may populate it from an init list").
    ///
    /// # Errors
    /// Returns the first [`FetcherError::Duplicate`] encountered.
    pub fn from_providers(
        providers: impl IntoIterator<Item = Arc<dyn Provider>>,
        config: &RouterConfig,
    ) -> Result<Self, FetcherError> {
        let registry = Self::new();
        for provider in providers {
            registry.register_provider(provider, config)?;
        }
        Ok(registry)
    }

    /// Register a provider, idempotent-by-name: a second registration under
    /// the same [`ProviderKey`] fails with [`FetcherError::Duplicate`].
    ///
    /// Also materializes every `(method, spec)` pair the provider was
    /// annotated with via [`Provider::method_specs`] into a fresh
    /// `MethodRegistration`, attached to the corresponding `ServiceMethod` —
    /// this is the registry-side half of `complete_registration()` (§9
    /// "Deferred method registration"): rather than a separate walk-all-
    /// instances pass, each provider completes its own registrations at
    /// `register_provider` time, which is equivalent for a registry that
    /// never un-registers providers.
    ///
    /// # Errors
    /// Returns [`FetcherError::Duplicate`] if `provider.key()` is already registered.
    pub fn register_provider(
        &self,
        provider: Arc<dyn Provider>,
        config: &RouterConfig,
    ) -> Result<(), FetcherError> {
        let key = provider.key();
        {
            let mut providers = self.providers.write().expect("registry mutex poisoned");
            if providers.contains_key(&key) {
                return Err(FetcherError::Duplicate {
                    provider: key.to_string(),
                });
            }
            providers.insert(
                key,
                ProviderEntry {
                    provider: Arc::clone(&provider),
                    health: Arc::new(HealthTracker::new(config.health_staleness)),
                },
            );
        }
        for &(method, spec) in provider.method_specs() {
            self.register_method(Arc::clone(&provider), method, spec);
        }
        Ok(())
    }

    /// Explicitly attach one more `(provider, method)` binding, independent
    /// of [`Provider::method_specs`]. Covers the contract's standalone
    /// `register_method(name, weight, qps, concurrency)` entry point for
    /// callers that compute specs dynamically rather than declaring them at
    /// adapter-definition time.
    pub fn register_method(
        &self,
        provider: Arc<dyn Provider>,
        method: Method,
        spec: tradinglab_types::MethodSpec,
    ) {
        let registration = Arc::new(MethodRegistration::new(provider, method, spec));
        self.methods
            .write()
            .expect("registry mutex poisoned")
            .entry(method)
            .or_default()
            .push(registration);
    }

    /// No-op finalizer kept for contract parity with the source system's
    /// `complete_registration()`: registrations are materialized eagerly at
    /// `register_provider` time, so calling this is never required, but
    /// doing so is always safe and idempotent.
    pub fn complete_registration(&self) {}

    /// All registrations currently attached to `method`, in registration order.
    #[must_use]
    pub fn registrations(&self, method: Method) -> Vec<Arc<MethodRegistration>> {
        self.methods
            .read()
            .expect("registry mutex poisoned")
            .get(&method)
            .cloned()
            .unwrap_or_default()
    }

    /// The health tracker backing a provider's `is_healthy`/`last_check_time`
    /// pair. `None` if `key` was never registered.
    #[must_use]
    pub fn health_tracker(&self, key: ProviderKey) -> Option<Arc<HealthTracker>> {
        self.providers
            .read()
            .expect("registry mutex poisoned")
            .get(&key)
            .map(|e| Arc::clone(&e.health))
    }

    /// Registered providers, for iteration by `stat()` and health sweeps.
    #[must_use]
    pub fn providers(&self) -> Vec<Arc<dyn Provider>> {
        self.providers
            .read()
            .expect("registry mutex poisoned")
            .values()
            .map(|e| Arc::clone(&e.provider))
            .collect()
    }

    /// All methods with at least one registration, for `stat()`.
    #[must_use]
    pub fn known_methods(&self) -> Vec<Method> {
        self.methods
            .read()
            .expect("registry mutex poisoned")
            .keys()
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn duplicate_provider_registration_fails() {
        let registry = Registry::new();
        let config = RouterConfig::default();
        registry
            .register_provider(Arc::new(StubProvider("dup")), &config)
            .unwrap();
        let err = registry
            .register_provider(Arc::new(StubProvider("dup")), &config)
            .unwrap_err();
        assert!(matches!(err, FetcherError::Duplicate { .. }));
    }

    #[test]
    fn unregistered_method_has_no_registrations() {
        let registry = Registry::new();
        assert!(registry.registrations(Method::FetchStockDailyData).is_empty());
    }

    #[test]
    fn register_method_attaches_to_service_method() {
        let registry = Registry::new();
        let config = RouterConfig::default();
        let provider = Arc::new(StubProvider("p1"));
        registry.register_provider(provider.clone(), &config).unwrap();
        registry.register_method(
            provider,
            Method::FetchStockDailyData,
            tradinglab_types::MethodSpec::default(),
        );
        assert_eq!(registry.registrations(Method::FetchStockDailyData).len(), 1);
    }
}
