//! tradinglab-repo: typed CRUD/upsert repositories over the daily-bar and
//! basic-info tables.
//!
//! Two backends are provided behind the same trait surface — [`sqlite`] for
//! tests and local development, [`postgres`] for deployment — mirroring the
//! source system's dual-dialect `INSERT ... ON CONFLICT` generation. Both
//! honor the same upsert and pagination contract so the cache service and
//! scheduler in `tradinglab-scheduler` are backend-agnostic.
#![warn(missing_docs)]

/// Paginated result envelope shared by both repository traits.
pub mod pagination;

/// The `stock_daily_data` repository trait and its SQLite/Postgres backends.
pub mod daily_bar;
/// The `stock_basic_info` repository trait and its SQLite/Postgres backends.
pub mod basic_info;

pub use basic_info::{BasicInfoRepository, PostgresBasicInfoRepository, SqliteBasicInfoRepository};
pub use daily_bar::{DailyBarRepository, PostgresDailyBarRepository, SqliteDailyBarRepository};
pub use pagination::Page;

/// Rows are upserted in batches of this size, matching the source system's
/// batch-insert chunking.
pub const UPSERT_BATCH_SIZE: usize = 1000;
