//! Observability payload returned by `Router::stat()` — the same structure
//! surfaced at the `/health` and `/metrics` HTTP boundary (§6).

use std::time::Instant;

use tradinglab_types::{Method, ProviderKey};

use crate::registration::RegistrationStat;

/// Health and probe-recency snapshot for one provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderStat {
    /// The provider's stable key.
    pub provider: ProviderKey,
    /// Cached health verdict at the time `stat()` was called.
    pub healthy: bool,
    /// Wall-clock time of the last health probe, if any has run yet.
    pub last_check: Option<Instant>,
}

/// Full router observability snapshot: cheap to compute (§4.2 "MUST be
/// cheap to compute... since it may be polled frequently") since it only
/// reads already-maintained atomics and mutex-guarded scalars, no querying.
#[derive(Debug, Clone, Default)]
pub struct RouterStat {
    /// One entry per registered provider.
    pub providers: Vec<ProviderStat>,
    /// One entry per `(method, provider)` registration.
    pub registrations: Vec<RegistrationStat>,
}

impl RouterStat {
    /// Registrations backing a given logical method, in registration order.
    #[must_use]
    pub fn for_method(&self, method: Method) -> Vec<&RegistrationStat> {
        self.registrations
            .iter()
            .filter(|r| r.method == method)
            .collect()
    }
}
