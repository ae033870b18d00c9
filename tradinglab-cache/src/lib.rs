//! tradinglab-cache: the gap-aware daily-bar cache service (§4.4).
//!
//! Overview
//! - `gaps`: pure helpers — trading-day enumeration, missing-day detection,
//!   contiguous-range merging. No I/O, easy to test exhaustively.
//! - `service::DailyBarCacheService`: wires those helpers to a `Router` (for
//!   gap fetches) and the `tradinglab-repo` repositories (for the cached
//!   read and the post-fetch upsert).
//!
//! Key behaviors and trade-offs
//! - Effective range: `max(start, listing_date)`; a query entirely before
//!   listing returns empty, never an error.
//! - Missing-range fetches run concurrently (`futures::future::join_all`);
//!   a failed range is logged and dropped, not propagated — the cache
//!   service still returns whatever it has (§4.4 "Failure semantics").
//! - Repository failures are fatal and propagated as-is.
//! - A second call over a subset of an already-fully-cached range issues
//!   zero upstream fetches (the "cache closure property", §4.4 invariants).
#![warn(missing_docs)]

/// Pure trading-day gap arithmetic.
pub mod gaps;
/// The cache service itself.
pub mod service;

pub use service::DailyBarCacheService;
