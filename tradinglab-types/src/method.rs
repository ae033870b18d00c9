//! Logical method names dispatched by the router.

use std::fmt;

/// One logical operation a `StockInfoFetcher` provider may implement.
///
/// Mirrors the protocol's method set so the router can key registrations,
/// stats and the static `(provider, method) -> MethodSpec` table by a cheap
/// `Copy` value instead of a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Method {
    /// `StockInfoFetcher::fetch_stock_daily_data`.
    FetchStockDailyData,
    /// `StockInfoFetcher::get_all_stock_basic_info`.
    GetAllStockBasicInfo,
    /// `StockInfoFetcher::get_stock_basic_info`.
    GetStockBasicInfo,
}

impl Method {
    /// Kebab-case identifier, stable across releases (used in logs and stats).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FetchStockDailyData => "fetch-stock-daily-data",
            Self::GetAllStockBasicInfo => "get-all-stock-basic-info",
            Self::GetStockBasicInfo => "get-stock-basic-info",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique, process-stable provider identifier (e.g. `"eastmoney"`, `"sina"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderKey(pub &'static str);

impl ProviderKey {
    /// Wrap a static provider name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Borrow the wrapped name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl From<ProviderKey> for &'static str {
    fn from(key: ProviderKey) -> Self {
        key.0
    }
}
