//! Unified error taxonomy shared by providers, the router, the cache service,
//! the repositories and the scheduler.

use thiserror::Error;

/// Five-way error classification surfaced at the HTTP/observability boundary.
///
/// Every [`FetcherError`] variant maps to exactly one of these via
/// [`FetcherError::kind`], so callers can make retry/alerting decisions
/// without matching on the full variant set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller supplied a malformed or out-of-range argument.
    Validation,
    /// The requested resource does not exist.
    ResourceNotFound,
    /// A well-formed request that cannot be satisfied for business reasons.
    Business,
    /// Every upstream provider failed or is currently unhealthy.
    UpstreamUnavailable,
    /// An internal invariant was violated (bug, IO failure, serialization bug).
    Internal,
}

/// Unified error type threaded through the registry, router, cache service,
/// repositories and scheduler.
#[derive(Debug, Error)]
pub enum FetcherError {
    /// A provider was already registered under this key.
    #[error("provider already registered: {provider}")]
    Duplicate {
        /// The colliding provider key.
        provider: String,
    },

    /// No provider implementing the requested method is registered, or every
    /// registered provider is currently unhealthy.
    #[error("no provider available for {method}")]
    NoProviderAvailable {
        /// The method that could not be dispatched.
        method: String,
    },

    /// An individual provider call returned an error.
    #[error("{provider} failed: {msg}")]
    Upstream {
        /// Provider key that failed.
        provider: String,
        /// Human-readable upstream error message.
        msg: String,
    },

    /// A provider call exceeded its per-attempt timeout.
    #[error("{provider} timed out after {elapsed:?}")]
    Timeout {
        /// Provider key that timed out.
        provider: String,
        /// How long the call ran before being aborted.
        elapsed: std::time::Duration,
    },

    /// All retries against all eligible providers were exhausted.
    #[error("exhausted {attempts} attempt(s) for {method}: {last}")]
    RetriesExhausted {
        /// Method being called.
        method: String,
        /// Total attempts made across all providers.
        attempts: u32,
        /// The most recent failure.
        #[source]
        last: Box<FetcherError>,
    },

    /// A bar or record failed the canonical schema invariants.
    #[error("schema violation: {reason}")]
    SchemaViolation {
        /// Description of the violated invariant.
        reason: String,
    },

    /// The requested resource (symbol, date range, job) does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing resource.
        what: String,
    },

    /// The caller supplied a malformed or out-of-range argument.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// A scheduler job identifier collided with an existing job.
    #[error("job already registered: {job_id}")]
    DuplicateJob {
        /// The colliding job id.
        job_id: String,
    },

    /// A cron expression failed to parse.
    #[error("invalid cron expression {expr}: {msg}")]
    InvalidCron {
        /// The offending expression.
        expr: String,
        /// Parser error message.
        msg: String,
    },

    /// The repository layer reported a database error.
    #[error("repository error: {0}")]
    Repository(#[from] sqlx::Error),

    /// An opaque internal error not covered by the above.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FetcherError {
    /// Classify this error into the five-way taxonomy used at the observability boundary.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArg(_) | Self::InvalidCron { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::ResourceNotFound,
            Self::Duplicate { .. } | Self::DuplicateJob { .. } | Self::SchemaViolation { .. } => {
                ErrorKind::Business
            }
            Self::NoProviderAvailable { .. }
            | Self::Upstream { .. }
            | Self::Timeout { .. }
            | Self::RetriesExhausted { .. } => ErrorKind::UpstreamUnavailable,
            Self::Repository(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Build a [`FetcherError::Upstream`] for a provider/message pair.
    pub fn upstream(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Upstream {
            provider: provider.into(),
            msg: msg.into(),
        }
    }

    /// Build a [`FetcherError::NotFound`] for a description of the missing resource.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_classifies_validation() {
        assert_eq!(
            FetcherError::InvalidArg("bad range".into()).kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn kind_classifies_upstream_unavailable() {
        assert_eq!(
            FetcherError::NoProviderAvailable {
                method: "fetch-stock-daily-data".into()
            }
            .kind(),
            ErrorKind::UpstreamUnavailable
        );
    }

    #[test]
    fn kind_classifies_business() {
        assert_eq!(
            FetcherError::SchemaViolation {
                reason: "bad bar".into()
            }
            .kind(),
            ErrorKind::Business
        );
    }
}
