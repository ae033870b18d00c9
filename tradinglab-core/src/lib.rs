//! tradinglab-core
//!
//! Core domain types, the provider protocol, the unified error taxonomy and
//! the trading-calendar helper shared by the router, the cache service, the
//! repositories and the scheduler.
//!
//! - `types`: canonical domain structures (`OhlcvBar`, `Exchange`, `StockBasicInfo`).
//! - `provider`: the `Provider` base interface and `StockInfoFetcher` protocol.
//! - `error`: the unified `FetcherError` type and its five-way classification.
//! - `calendar`: the China A-share trading-day helper.
#![warn(missing_docs)]

/// Core error type and classification shared by every in-scope component.
pub mod error;
/// The `Provider` base interface and the `StockInfoFetcher` protocol.
pub mod provider;
/// Canonical domain types (bars, exchanges, basic info).
pub mod types;

/// China A-share trading-day calendar.
pub mod calendar;

pub use calendar::is_trading_day;
pub use error::{ErrorKind, FetcherError};
pub use provider::{Provider, StockInfoFetcher};
pub use types::{Exchange, OhlcvBar, StockBasicInfo};
