//! Shared helpers: client construction honoring per-provider timeout/proxy,
//! exchange inference from a bare A-share code, and board classification.

use std::sync::Mutex;
use std::time::Duration;

use tradinglab_core::{Exchange, FetcherError};

/// Interior-mutable timeout/proxy pair every adapter carries, mirroring the
/// source system's `StockDataSource` base class (`set_timeout`/`set_proxy`).
pub struct NetworkSettings {
    timeout: Mutex<Duration>,
    proxy: Mutex<Option<String>>,
}

impl NetworkSettings {
    pub fn new() -> Self {
        Self {
            timeout: Mutex::new(Duration::from_secs(10)),
            proxy: Mutex::new(None),
        }
    }

    pub fn timeout(&self) -> Duration {
        *self.timeout.lock().expect("mutex poisoned")
    }

    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock().expect("mutex poisoned") = timeout;
    }

    pub fn proxy(&self) -> Option<String> {
        self.proxy.lock().expect("mutex poisoned").clone()
    }

    pub fn set_proxy(&self, proxy: Option<String>) {
        *self.proxy.lock().expect("mutex poisoned") = proxy;
    }

    /// Build a fresh client reflecting the current timeout/proxy. Built
    /// per-call rather than cached so a `set_proxy`/`set_timeout` call takes
    /// effect on the very next request.
    pub fn client(&self, provider: &str) -> Result<reqwest::Client, FetcherError> {
        let mut builder = reqwest::Client::builder().timeout(self.timeout());
        if let Some(proxy) = self.proxy() {
            let proxy = reqwest::Proxy::all(&proxy)
                .map_err(|e| FetcherError::upstream(provider, format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| FetcherError::upstream(provider, format!("failed to build client: {e}")))
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Infer the listing exchange from a bare A-share code, using the standard
/// prefix convention (mirrors the source system's per-exchange fetch split
/// in `datasources/exchange.py`, applied in reverse).
#[must_use]
pub fn infer_exchange(symbol: &str) -> Option<Exchange> {
    match symbol.as_bytes().first()? {
        b'6' => Some(Exchange::SH),
        b'0' | b'3' => Some(Exchange::SZ),
        b'4' | b'8' | b'9' => Some(Exchange::BJ),
        _ => None,
    }
}

/// Classify the board (板块) a code trades on, for the basic-info `section` field.
#[must_use]
pub fn classify_section(symbol: &str) -> &'static str {
    if symbol.starts_with("688") {
        "科创板"
    } else if symbol.starts_with("300") || symbol.starts_with("301") {
        "创业板"
    } else if symbol.starts_with('8') || symbol.starts_with('4') || symbol.starts_with('9') {
        "北交所"
    } else {
        "主板"
    }
}
