//! `stock_basic_info` repository: the [`BasicInfoRepository`] trait plus its
//! SQLite and Postgres backends, keyed by `symbol`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row, Sqlite};
use tradinglab_core::{Exchange, FetcherError, StockBasicInfo};

use crate::pagination::Page;
use crate::UPSERT_BATCH_SIZE;

const INSERT_COLUMNS: &str = "symbol, exchange, section, stock_type, name, listing_date, industry, total_shares, float_shares, total_market_value, float_market_value, last_update";

const UPDATE_COLUMNS: &[&str] = &[
    "exchange",
    "section",
    "stock_type",
    "name",
    "listing_date",
    "industry",
    "total_shares",
    "float_shares",
    "total_market_value",
    "float_market_value",
    "last_update",
];

/// Typed upsert/query surface over the `stock_basic_info` table, keyed by `symbol`.
#[async_trait]
pub trait BasicInfoRepository: Send + Sync {
    /// Upsert a single record; conflict key `symbol`.
    async fn upsert_one(&self, info: &StockBasicInfo) -> Result<(), FetcherError>;

    /// Upsert `infos` in batches of [`UPSERT_BATCH_SIZE`].
    async fn upsert_many(&self, infos: &[StockBasicInfo]) -> Result<(), FetcherError>;

    /// Fetch one record by `symbol`, if present.
    async fn get(&self, symbol: &str) -> Result<Option<StockBasicInfo>, FetcherError>;

    /// Every known symbol, in no particular order — used by the scheduler
    /// to enumerate the refresh universe.
    async fn list_symbols(&self) -> Result<Vec<String>, FetcherError>;

    /// Paginated listing, optionally filtered by a `name`/`symbol` substring
    /// keyword. Runs the page query and the `count(*)` concurrently.
    async fn list_paged(
        &self,
        page: i64,
        page_size: i64,
        keyword: Option<&str>,
    ) -> Result<Page<StockBasicInfo>, FetcherError>;
}

fn insert_values_clause(placeholder: impl Fn(usize) -> String, row_count: usize, cols: usize) -> String {
    let mut clause = String::new();
    let mut idx = 1;
    for row in 0..row_count {
        if row > 0 {
            clause.push_str(", ");
        }
        clause.push('(');
        for col in 0..cols {
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

fn row_to_info(row: &sqlx::sqlite::SqliteRow) -> Result<StockBasicInfo, FetcherError> {
    let exchange_code: String = row.try_get("exchange").map_err(FetcherError::Repository)?;
    let exchange = Exchange::from_code(&exchange_code)
        .ok_or_else(|| FetcherError::SchemaViolation { reason: format!("unknown exchange code {exchange_code}") })?;
    Ok(StockBasicInfo {
        symbol: row.try_get("symbol").map_err(FetcherError::Repository)?,
        exchange,
        section: row.try_get("section").map_err(FetcherError::Repository)?,
        stock_type: row.try_get("stock_type").map_err(FetcherError::Repository)?,
        name: row.try_get("name").map_err(FetcherError::Repository)?,
        listing_date: row.try_get("listing_date").map_err(FetcherError::Repository)?,
        industry: row.try_get("industry").map_err(FetcherError::Repository)?,
        total_shares: row.try_get("total_shares").map_err(FetcherError::Repository)?,
        float_shares: row.try_get("float_shares").map_err(FetcherError::Repository)?,
        total_market_value: row.try_get("total_market_value").map_err(FetcherError::Repository)?,
        float_market_value: row.try_get("float_market_value").map_err(FetcherError::Repository)?,
        last_update: row
            .try_get::<chrono::NaiveDateTime, _>("last_update")
            .map_err(FetcherError::Repository)?
            .and_utc(),
    })
}

fn row_to_info_pg(row: &sqlx::postgres::PgRow) -> Result<StockBasicInfo, FetcherError> {
    let exchange_code: String = row.try_get("exchange").map_err(FetcherError::Repository)?;
    let exchange = Exchange::from_code(&exchange_code)
        .ok_or_else(|| FetcherError::SchemaViolation { reason: format!("unknown exchange code {exchange_code}") })?;
    Ok(StockBasicInfo {
        symbol: row.try_get("symbol").map_err(FetcherError::Repository)?,
        exchange,
        section: row.try_get("section").map_err(FetcherError::Repository)?,
        stock_type: row.try_get("stock_type").map_err(FetcherError::Repository)?,
        name: row.try_get("name").map_err(FetcherError::Repository)?,
        listing_date: row.try_get("listing_date").map_err(FetcherError::Repository)?,
        industry: row.try_get("industry").map_err(FetcherError::Repository)?,
        total_shares: row.try_get("total_shares").map_err(FetcherError::Repository)?,
        float_shares: row.try_get("float_shares").map_err(FetcherError::Repository)?,
        total_market_value: row.try_get("total_market_value").map_err(FetcherError::Repository)?,
        float_market_value: row.try_get("float_market_value").map_err(FetcherError::Repository)?,
        last_update: row
            .try_get::<chrono::NaiveDateTime, _>("last_update")
            .map_err(FetcherError::Repository)?
            .and_utc(),
    })
}

/// SQLite-backed [`BasicInfoRepository`], for tests and local development.
pub struct SqliteBasicInfoRepository {
    pool: Pool<Sqlite>,
}

impl SqliteBasicInfoRepository {
    /// Wrap an already-pooled SQLite connection. Pool construction is the
    /// caller's responsibility.
    #[must_use]
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Create the `stock_basic_info` table if it does not already exist.
    pub async fn ensure_schema(&self) -> Result<(), FetcherError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS stock_basic_info (
                symbol TEXT PRIMARY KEY,
                exchange TEXT NOT NULL,
                section TEXT NOT NULL,
                stock_type TEXT,
                name TEXT NOT NULL,
                listing_date DATE,
                industry TEXT,
                total_shares NUMERIC,
                float_shares NUMERIC,
                total_market_value NUMERIC,
                float_market_value NUMERIC,
                last_update TIMESTAMP NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(FetcherError::Repository)?;
        Ok(())
    }

    async fn upsert_chunk(&self, infos: &[StockBasicInfo]) -> Result<(), FetcherError> {
        if infos.is_empty() {
            return Ok(());
        }
        let now = Utc::now().naive_utc();
        let sql = format!(
            "INSERT INTO stock_basic_info ({cols}) VALUES {values} \
             ON CONFLICT(symbol) DO UPDATE SET {updates}",
            cols = INSERT_COLUMNS,
            values = insert_values_clause(|_| "?".to_string(), infos.len(), 12),
            updates = update_set_clause(),
        );
        let mut query = sqlx::query(&sql);
        for info in infos {
            query = query
                .bind(&info.symbol)
                .bind(info.exchange.as_str())
                .bind(&info.section)
                .bind(&info.stock_type)
                .bind(&info.name)
                .bind(info.listing_date)
                .bind(&info.industry)
                .bind(info.total_shares)
                .bind(info.float_shares)
                .bind(info.total_market_value)
                .bind(info.float_market_value)
                .bind(now);
        }
        query.execute(&self.pool).await.map_err(FetcherError::Repository)?;
        Ok(())
    }
}

#[async_trait]
impl BasicInfoRepository for SqliteBasicInfoRepository {
    async fn upsert_one(&self, info: &StockBasicInfo) -> Result<(), FetcherError> {
        self.upsert_chunk(std::slice::from_ref(info)).await
    }

    async fn upsert_many(&self, infos: &[StockBasicInfo]) -> Result<(), FetcherError> {
        for chunk in infos.chunks(UPSERT_BATCH_SIZE) {
            self.upsert_chunk(chunk).await?;
        }
        Ok(())
    }

    async fn get(&self, symbol: &str) -> Result<Option<StockBasicInfo>, FetcherError> {
        let row = sqlx::query("SELECT * FROM stock_basic_info WHERE symbol = ?")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await
            .map_err(FetcherError::Repository)?;
        row.as_ref().map(row_to_info).transpose()
    }

    async fn list_symbols(&self) -> Result<Vec<String>, FetcherError> {
        let rows = sqlx::query("SELECT symbol FROM stock_basic_info")
            .fetch_all(&self.pool)
            .await
            .map_err(FetcherError::Repository)?;
        rows.iter()
            .map(|r| r.try_get("symbol").map_err(FetcherError::Repository))
            .collect()
    }

    async fn list_paged(
        &self,
        page: i64,
        page_size: i64,
        keyword: Option<&str>,
    ) -> Result<Page<StockBasicInfo>, FetcherError> {
        let offset = (page.max(1) - 1) * page_size;
        let like = keyword.map(|k| format!("%{k}%"));
        let (rows_result, count_result) = tokio::join!(
            async {
                match &like {
                    Some(pattern) => sqlx::query(
                        "SELECT * FROM stock_basic_info WHERE symbol LIKE ? OR name LIKE ? ORDER BY symbol ASC LIMIT ? OFFSET ?",
                    )
                    .bind(pattern)
                    .bind(pattern)
                    .bind(page_size)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await,
                    None => sqlx::query("SELECT * FROM stock_basic_info ORDER BY symbol ASC LIMIT ? OFFSET ?")
                        .bind(page_size)
                        .bind(offset)
                        .fetch_all(&self.pool)
                        .await,
                }
            },
            async {
                match &like {
                    Some(pattern) => sqlx::query("SELECT COUNT(*) AS n FROM stock_basic_info WHERE symbol LIKE ? OR name LIKE ?")
                        .bind(pattern)
                        .bind(pattern)
                        .fetch_one(&self.pool)
                        .await,
                    None => sqlx::query("SELECT COUNT(*) AS n FROM stock_basic_info")
                        .fetch_one(&self.pool)
                        .await,
                }
            },
        );
        let rows = rows_result.map_err(FetcherError::Repository)?;
        let count_row = count_result.map_err(FetcherError::Repository)?;
        let total: i64 = count_row.try_get("n").map_err(FetcherError::Repository)?;
        let items = rows.iter().map(row_to_info).collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total, page, page_size))
    }
}

/// Postgres-backed [`BasicInfoRepository`], for deployment.
pub struct PostgresBasicInfoRepository {
    pool: Pool<Postgres>,
}

impl PostgresBasicInfoRepository {
    /// Wrap an already-pooled Postgres connection. Pool construction is the
    /// caller's responsibility.
    #[must_use]
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn upsert_chunk(&self, infos: &[StockBasicInfo]) -> Result<(), FetcherError> {
        if infos.is_empty() {
            return Ok(());
        }
        let now = Utc::now().naive_utc();
        let sql = format!(
            "INSERT INTO stock_basic_info ({cols}) VALUES {values} \
             ON CONFLICT (symbol) DO UPDATE SET {updates}",
            cols = INSERT_COLUMNS,
            values = insert_values_clause(|idx| format!("${idx}"), infos.len(), 12),
            updates = update_set_clause(),
        );
        let mut query = sqlx::query(&sql);
        for info in infos {
            query = query
                .bind(&info.symbol)
                .bind(info.exchange.as_str())
                .bind(&info.section)
                .bind(&info.stock_type)
                .bind(&info.name)
                .bind(info.listing_date)
                .bind(&info.industry)
                .bind(info.total_shares)
                .bind(info.float_shares)
                .bind(info.total_market_value)
                .bind(info.float_market_value)
                .bind(now);
        }
        query.execute(&self.pool).await.map_err(FetcherError::Repository)?;
        Ok(())
    }
}

#[async_trait]
impl BasicInfoRepository for PostgresBasicInfoRepository {
    async fn upsert_one(&self, info: &StockBasicInfo) -> Result<(), FetcherError> {
        self.upsert_chunk(std::slice::from_ref(info)).await
    }

    async fn upsert_many(&self, infos: &[StockBasicInfo]) -> Result<(), FetcherError> {
        for chunk in infos.chunks(UPSERT_BATCH_SIZE) {
            self.upsert_chunk(chunk).await?;
        }
        Ok(())
    }

    async fn get(&self, symbol: &str) -> Result<Option<StockBasicInfo>, FetcherError> {
        let row = sqlx::query("SELECT * FROM stock_basic_info WHERE symbol = $1")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await
            .map_err(FetcherError::Repository)?;
        row.as_ref().map(row_to_info_pg).transpose()
    }

    async fn list_symbols(&self) -> Result<Vec<String>, FetcherError> {
        let rows = sqlx::query("SELECT symbol FROM stock_basic_info")
            .fetch_all(&self.pool)
            .await
            .map_err(FetcherError::Repository)?;
        rows.iter()
            .map(|r| r.try_get("symbol").map_err(FetcherError::Repository))
            .collect()
    }

    async fn list_paged(
        &self,
        page: i64,
        page_size: i64,
        keyword: Option<&str>,
    ) -> Result<Page<StockBasicInfo>, FetcherError> {
        let offset = (page.max(1) - 1) * page_size;
        let like = keyword.map(|k| format!("%{k}%"));
        let (rows_result, count_result) = tokio::join!(
            async {
                match &like {
                    Some(pattern) => sqlx::query(
                        "SELECT * FROM stock_basic_info WHERE symbol LIKE $1 OR name LIKE $1 ORDER BY symbol ASC LIMIT $2 OFFSET $3",
                    )
                    .bind(pattern)
                    .bind(page_size)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await,
                    None => sqlx::query("SELECT * FROM stock_basic_info ORDER BY symbol ASC LIMIT $1 OFFSET $2")
                        .bind(page_size)
                        .bind(offset)
                        .fetch_all(&self.pool)
                        .await,
                }
            },
            async {
                match &like {
                    Some(pattern) => sqlx::query("SELECT COUNT(*) AS n FROM stock_basic_info WHERE symbol LIKE $1 OR name LIKE $1")
                        .bind(pattern)
                        .fetch_one(&self.pool)
                        .await,
                    None => sqlx::query("SELECT COUNT(*) AS n FROM stock_basic_info")
                        .fetch_one(&self.pool)
                        .await,
                }
            },
        );
        let rows = rows_result.map_err(FetcherError::Repository)?;
        let count_row = count_result.map_err(FetcherError::Repository)?;
        let total: i64 = count_row.try_get("n").map_err(FetcherError::Repository)?;
        let items = rows.iter().map(row_to_info_pg).collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total, page, page_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    fn info(symbol: &str, name: &str) -> StockBasicInfo {
        StockBasicInfo {
            symbol: symbol.to_string(),
            exchange: Exchange::SH,
            section: "主板".to_string(),
            stock_type: Some("A股".to_string()),
            name: name.to_string(),
            listing_date: None,
            industry: None,
            total_shares: None,
            float_shares: None,
            total_market_value: None,
            float_market_value: None,
            last_update: Utc::now(),
        }
    }

    async fn setup() -> SqliteBasicInfoRepository {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        let repo = SqliteBasicInfoRepository::new(pool);
        repo.ensure_schema().await.unwrap();
        repo
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let repo = setup().await;
        repo.upsert_one(&info("600000", "Example Co")).await.unwrap();

        let got = repo.get("600000").await.unwrap().unwrap();
        assert_eq!(got.name, "Example Co");
        assert_eq!(got.exchange, Exchange::SH);
    }

    #[tokio::test]
    async fn upsert_on_same_symbol_updates_name() {
        let repo = setup().await;
        repo.upsert_one(&info("600000", "Old Name")).await.unwrap();
        repo.upsert_one(&info("600000", "New Name")).await.unwrap();

        let got = repo.get("600000").await.unwrap().unwrap();
        assert_eq!(got.name, "New Name");
    }

    #[tokio::test]
    async fn missing_symbol_returns_none() {
        let repo = setup().await;
        assert!(repo.get("999999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_paged_filters_by_keyword() {
        let repo = setup().await;
        repo.upsert_many(&[info("600000", "Foo Corp"), info("000001", "Bar Inc")])
            .await
            .unwrap();

        let page = repo.list_paged(1, 10, Some("Foo")).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].symbol, "600000");
    }

    #[tokio::test]
    async fn list_symbols_returns_every_row() {
        let repo = setup().await;
        repo.upsert_many(&[info("600000", "Foo"), info("000001", "Bar")])
            .await
            .unwrap();

        let mut symbols = repo.list_symbols().await.unwrap();
        symbols.sort();
        assert_eq!(symbols, vec!["000001".to_string(), "600000".to_string()]);
    }
}
