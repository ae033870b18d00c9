//! `stock_daily_data` repository: the [`DailyBarRepository`] trait plus its
//! SQLite and Postgres backends.
//!
//! Both backends build the same `INSERT ... ON CONFLICT (symbol, trade_date)
//! DO UPDATE` shape; only the bind-placeholder syntax differs ($N vs ?),
//! mirroring the source system's dual-dialect upsert generation.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{Pool, Postgres, Row, Sqlite};
use tradinglab_core::{FetcherError, OhlcvBar};

use crate::pagination::Page;
use crate::UPSERT_BATCH_SIZE;

const INSERT_COLUMNS: &str =
    "symbol, trade_date, open, high, low, close, volume, trading_value, amplitude, pct_change, price_change, turnover_rate, last_update";

const UPDATE_COLUMNS: &[&str] = &[
    "open",
    "high",
    "low",
    "close",
    "volume",
    "trading_value",
    "amplitude",
    "pct_change",
    "price_change",
    "turnover_rate",
    "last_update",
];

/// Typed upsert/query surface over the `stock_daily_data` table, keyed by
/// `(symbol, trade_date)`.
#[async_trait]
pub trait DailyBarRepository: Send + Sync {
    /// Upsert a single bar; conflict key `(symbol, trade_date)`.
    async fn upsert_one(&self, bar: &OhlcvBar) -> Result<(), FetcherError>;

    /// Upsert `bars` in batches of [`UPSERT_BATCH_SIZE`]. Auto-increment
    /// primary keys have none here (the table's PK is the conflict key
    /// itself), so every column is eligible for both the insert tuple and
    /// the update set.
    async fn upsert_many(&self, bars: &[OhlcvBar]) -> Result<(), FetcherError>;

    /// All bars for `symbol` with `trade_date` in `[start, end]`, ascending.
    async fn list_for_symbol(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, FetcherError>;

    /// Paginated listing across every symbol, optionally filtered to one
    /// `symbol`. Runs the page query and the `count(*)` concurrently.
    async fn list_paged(
        &self,
        page: i64,
        page_size: i64,
        symbol: Option<&str>,
    ) -> Result<Page<OhlcvBar>, FetcherError>;
}

fn insert_values_clause(placeholder: impl Fn(usize) -> String, row_count: usize) -> String {
    let mut clause = String::new();
    let mut idx = 1;
    for row in 0..row_count {
        if row > 0 {
            clause.push_str(", ");
        }
        clause.push('(');
        for col in 0..13 {
            if col > 0 {
                clause.push_str(", ");
            }
            clause.push_str(&placeholder(idx));
            idx += 1;
        }
        clause.push(')');
    }
    clause
}

fn update_set_clause() -> String {
    UPDATE_COLUMNS
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn row_to_bar(row: &sqlx::sqlite::SqliteRow) -> Result<OhlcvBar, FetcherError> {
    let volume: i64 = row.try_get("volume").map_err(FetcherError::Repository)?;
    Ok(OhlcvBar {
        timestamp: row.try_get("trade_date").map_err(FetcherError::Repository)?,
        symbol: row.try_get("symbol").map_err(FetcherError::Repository)?,
        open: row.try_get("open").map_err(FetcherError::Repository)?,
        high: row.try_get("high").map_err(FetcherError::Repository)?,
        low: row.try_get("low").map_err(FetcherError::Repository)?,
        close: row.try_get("close").map_err(FetcherError::Repository)?,
        volume: volume.max(0) as u64,
        trading_value: row.try_get("trading_value").map_err(FetcherError::Repository)?,
        amplitude: row.try_get("amplitude").map_err(FetcherError::Repository)?,
        pct_change: row.try_get("pct_change").map_err(FetcherError::Repository)?,
        price_change: row.try_get("price_change").map_err(FetcherError::Repository)?,
        turnover_rate: row.try_get("turnover_rate").map_err(FetcherError::Repository)?,
    })
}

fn row_to_bar_pg(row: &sqlx::postgres::PgRow) -> Result<OhlcvBar, FetcherError> {
    let volume: i64 = row.try_get("volume").map_err(FetcherError::Repository)?;
    Ok(OhlcvBar {
        timestamp: row.try_get("trade_date").map_err(FetcherError::Repository)?,
        symbol: row.try_get("symbol").map_err(FetcherError::Repository)?,
        open: row.try_get("open").map_err(FetcherError::Repository)?,
        high: row.try_get("high").map_err(FetcherError::Repository)?,
        low: row.try_get("low").map_err(FetcherError::Repository)?,
        close: row.try_get("close").map_err(FetcherError::Repository)?,
        volume: volume.max(0) as u64,
        trading_value: row.try_get("trading_value").map_err(FetcherError::Repository)?,
        amplitude: row.try_get("amplitude").map_err(FetcherError::Repository)?,
        pct_change: row.try_get("pct_change").map_err(FetcherError::Repository)?,
        price_change: row.try_get("price_change").map_err(FetcherError::Repository)?,
        turnover_rate: row.try_get("turnover_rate").map_err(FetcherError::Repository)?,
    })
}

/// SQLite-backed [`DailyBarRepository`], for tests and local development.
pub struct SqliteDailyBarRepository {
    pool: Pool<Sqlite>,
}

impl SqliteDailyBarRepository {
    /// Wrap an already-pooled SQLite connection. Pool construction is the
    /// caller's responsibility.
    #[must_use]
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Create the `stock_daily_data` table if it does not already exist.
    /// A convenience for tests and first-run bootstrap, not a migration tool.
    pub async fn ensure_schema(&self) -> Result<(), FetcherError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS stock_daily_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                trade_date DATE NOT NULL,
                open NUMERIC NOT NULL,
                high NUMERIC NOT NULL,
                low NUMERIC NOT NULL,
                close NUMERIC NOT NULL,
                volume INTEGER NOT NULL,
                trading_value NUMERIC,
                amplitude NUMERIC,
                pct_change NUMERIC,
                price_change NUMERIC,
                turnover_rate NUMERIC,
                last_update TIMESTAMP NOT NULL,
                UNIQUE (symbol, trade_date)
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(FetcherError::Repository)?;
        Ok(())
    }

    async fn upsert_chunk(&self, bars: &[OhlcvBar]) -> Result<(), FetcherError> {
        if bars.is_empty() {
            return Ok(());
        }
        let now = Utc::now().naive_utc();
        let sql = format!(
            "INSERT INTO stock_daily_data ({cols}) VALUES {values} \
             ON CONFLICT(symbol, trade_date) DO UPDATE SET {updates}",
            cols = INSERT_COLUMNS,
            values = insert_values_clause(|_| "?".to_string(), bars.len()),
            updates = update_set_clause(),
        );
        let mut query = sqlx::query(&sql);
        for bar in bars {
            query = query
                .bind(&bar.symbol)
                .bind(bar.timestamp)
                .bind(bar.open)
                .bind(bar.high)
                .bind(bar.low)
                .bind(bar.close)
                .bind(bar.volume as i64)
                .bind(bar.trading_value)
                .bind(bar.amplitude)
                .bind(bar.pct_change)
                .bind(bar.price_change)
                .bind(bar.turnover_rate)
                .bind(now);
        }
        query.execute(&self.pool).await.map_err(FetcherError::Repository)?;
        Ok(())
    }
}

#[async_trait]
impl DailyBarRepository for SqliteDailyBarRepository {
    async fn upsert_one(&self, bar: &OhlcvBar) -> Result<(), FetcherError> {
        self.upsert_chunk(std::slice::from_ref(bar)).await
    }

    async fn upsert_many(&self, bars: &[OhlcvBar]) -> Result<(), FetcherError> {
        for chunk in bars.chunks(UPSERT_BATCH_SIZE) {
            self.upsert_chunk(chunk).await?;
        }
        Ok(())
    }

    async fn list_for_symbol(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, FetcherError> {
        let rows = sqlx::query(
            "SELECT * FROM stock_daily_data WHERE symbol = ? AND trade_date BETWEEN ? AND ? ORDER BY trade_date ASC",
        )
        .bind(symbol)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(FetcherError::Repository)?;
        rows.iter().map(row_to_bar).collect()
    }

    async fn list_paged(
        &self,
        page: i64,
        page_size: i64,
        symbol: Option<&str>,
    ) -> Result<Page<OhlcvBar>, FetcherError> {
        let offset = (page.max(1) - 1) * page_size;
        let (rows_result, count_result) = tokio::join!(
            async {
                match symbol {
                    Some(s) => sqlx::query(
                        "SELECT * FROM stock_daily_data WHERE symbol = ? ORDER BY trade_date ASC LIMIT ? OFFSET ?",
                    )
                    .bind(s)
                    .bind(page_size)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await,
                    None => sqlx::query("SELECT * FROM stock_daily_data ORDER BY trade_date ASC LIMIT ? OFFSET ?")
                        .bind(page_size)
                        .bind(offset)
                        .fetch_all(&self.pool)
                        .await,
                }
            },
            async {
                match symbol {
                    Some(s) => sqlx::query("SELECT COUNT(*) AS n FROM stock_daily_data WHERE symbol = ?")
                        .bind(s)
                        .fetch_one(&self.pool)
                        .await,
                    None => sqlx::query("SELECT COUNT(*) AS n FROM stock_daily_data")
                        .fetch_one(&self.pool)
                        .await,
                }
            },
        );
        let rows = rows_result.map_err(FetcherError::Repository)?;
        let count_row = count_result.map_err(FetcherError::Repository)?;
        let total: i64 = count_row.try_get("n").map_err(FetcherError::Repository)?;
        let items = rows.iter().map(row_to_bar).collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total, page, page_size))
    }
}

/// Postgres-backed [`DailyBarRepository`], for deployment.
pub struct PostgresDailyBarRepository {
    pool: Pool<Postgres>,
}

impl PostgresDailyBarRepository {
    /// Wrap an already-pooled Postgres connection. Pool construction is the
    /// caller's responsibility.
    #[must_use]
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn upsert_chunk(&self, bars: &[OhlcvBar]) -> Result<(), FetcherError> {
        if bars.is_empty() {
            return Ok(());
        }
        let now = Utc::now().naive_utc();
        let sql = format!(
            "INSERT INTO stock_daily_data ({cols}) VALUES {values} \
             ON CONFLICT (symbol, trade_date) DO UPDATE SET {updates}",
            cols = INSERT_COLUMNS,
            values = insert_values_clause(|idx| format!("${idx}"), bars.len()),
            updates = update_set_clause(),
        );
        let mut query = sqlx::query(&sql);
        for bar in bars {
            query = query
                .bind(&bar.symbol)
                .bind(bar.timestamp)
                .bind(bar.open)
                .bind(bar.high)
                .bind(bar.low)
                .bind(bar.close)
                .bind(bar.volume as i64)
                .bind(bar.trading_value)
                .bind(bar.amplitude)
                .bind(bar.pct_change)
                .bind(bar.price_change)
                .bind(bar.turnover_rate)
                .bind(now);
        }
        query.execute(&self.pool).await.map_err(FetcherError::Repository)?;
        Ok(())
    }
}

#[async_trait]
impl DailyBarRepository for PostgresDailyBarRepository {
    async fn upsert_one(&self, bar: &OhlcvBar) -> Result<(), FetcherError> {
        self.upsert_chunk(std::slice::from_ref(bar)).await
    }

    async fn upsert_many(&self, bars: &[OhlcvBar]) -> Result<(), FetcherError> {
        for chunk in bars.chunks(UPSERT_BATCH_SIZE) {
            self.upsert_chunk(chunk).await?;
        }
        Ok(())
    }

    async fn list_for_symbol(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, FetcherError> {
        let rows = sqlx::query(
            "SELECT * FROM stock_daily_data WHERE symbol = $1 AND trade_date BETWEEN $2 AND $3 ORDER BY trade_date ASC",
        )
        .bind(symbol)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(FetcherError::Repository)?;
        rows.iter().map(row_to_bar_pg).collect()
    }

    async fn list_paged(
        &self,
        page: i64,
        page_size: i64,
        symbol: Option<&str>,
    ) -> Result<Page<OhlcvBar>, FetcherError> {
        let offset = (page.max(1) - 1) * page_size;
        let (rows_result, count_result) = tokio::join!(
            async {
                match symbol {
                    Some(s) => sqlx::query(
                        "SELECT * FROM stock_daily_data WHERE symbol = $1 ORDER BY trade_date ASC LIMIT $2 OFFSET $3",
                    )
                    .bind(s)
                    .bind(page_size)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await,
                    None => sqlx::query("SELECT * FROM stock_daily_data ORDER BY trade_date ASC LIMIT $1 OFFSET $2")
                        .bind(page_size)
                        .bind(offset)
                        .fetch_all(&self.pool)
                        .await,
                }
            },
            async {
                match symbol {
                    Some(s) => sqlx::query("SELECT COUNT(*) AS n FROM stock_daily_data WHERE symbol = $1")
                        .bind(s)
                        .fetch_one(&self.pool)
                        .await,
                    None => sqlx::query("SELECT COUNT(*) AS n FROM stock_daily_data")
                        .fetch_one(&self.pool)
                        .await,
                }
            },
        );
        let rows = rows_result.map_err(FetcherError::Repository)?;
        let count_row = count_result.map_err(FetcherError::Repository)?;
        let total: i64 = count_row.try_get("n").map_err(FetcherError::Repository)?;
        let items = rows.iter().map(row_to_bar_pg).collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total, page, page_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    fn bar(symbol: &str, date: &str, close: &str) -> OhlcvBar {
        OhlcvBar {
            timestamp: date.parse().unwrap(),
            symbol: symbol.to_string(),
            open: close.parse().unwrap(),
            high: close.parse().unwrap(),
            low: close.parse().unwrap(),
            close: close.parse().unwrap(),
            volume: 1000,
            trading_value: None,
            amplitude: None,
            pct_change: None,
            price_change: None,
            turnover_rate: None,
        }
    }

    async fn setup() -> SqliteDailyBarRepository {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        let repo = SqliteDailyBarRepository::new(pool);
        repo.ensure_schema().await.unwrap();
        repo
    }

    #[tokio::test]
    async fn upsert_then_read_round_trips() {
        let repo = setup().await;
        let b = bar("600000", "2024-01-02", "10.50");
        repo.upsert_one(&b).await.unwrap();

        let rows = repo
            .list_for_symbol("600000", "2024-01-01".parse().unwrap(), "2024-01-03".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].close.to_string(), "10.50");
    }

    #[tokio::test]
    async fn upsert_on_same_key_updates_in_place() {
        let repo = setup().await;
        repo.upsert_one(&bar("600000", "2024-01-02", "10.00")).await.unwrap();
        repo.upsert_one(&bar("600000", "2024-01-02", "11.00")).await.unwrap();

        let rows = repo
            .list_for_symbol("600000", "2024-01-02".parse().unwrap(), "2024-01-02".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].close.to_string(), "11.00");
    }

    #[tokio::test]
    async fn upsert_many_batches_across_symbols() {
        let repo = setup().await;
        let bars = vec![
            bar("600000", "2024-01-02", "10.00"),
            bar("600000", "2024-01-03", "10.10"),
            bar("000001", "2024-01-02", "20.00"),
        ];
        repo.upsert_many(&bars).await.unwrap();

        let page = repo.list_paged(1, 10, None).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 3);
    }

    #[tokio::test]
    async fn list_paged_filters_by_symbol() {
        let repo = setup().await;
        repo.upsert_many(&[
            bar("600000", "2024-01-02", "10.00"),
            bar("000001", "2024-01-02", "20.00"),
        ])
        .await
        .unwrap();

        let page = repo.list_paged(1, 10, Some("600000")).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].symbol, "600000");
    }
}
