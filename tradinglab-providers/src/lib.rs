//! tradinglab-providers: HTTP-backed `StockInfoFetcher` adapters.
//!
//! Two independent adapters are provided, both implementing the same
//! `Provider` + `StockInfoFetcher` surface so the router can fail over
//! between them and weight their selection independently:
//!
//! - [`eastmoney::EastmoneyProvider`]: Eastmoney (东方财富) push2 JSON API.
//! - [`sina::SinaProvider`]: Sina Finance (新浪财经) JSON-P kline API.
//!
//! Both adapters normalize upstream units (lots to shares, `YYYYMMDD` dates)
//! to the canonical schema in `tradinglab_core::types` and validate every bar
//! with [`tradinglab_core::OhlcvBar::validate`] before returning it.
#![warn(missing_docs)]

mod common;
/// Eastmoney (东方财富) adapter.
pub mod eastmoney;
/// Sina Finance (新浪财经) adapter.
pub mod sina;

pub use eastmoney::EastmoneyProvider;
pub use sina::SinaProvider;
