//! Persisted job record (§3 "Job") and the [`JobStore`] trait that makes
//! scheduled refreshes durable across restarts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row, Sqlite};
use tradinglab_core::FetcherError;

/// One scheduled job, persisted so a restarted process can recover its
/// cron trigger and the timestamp of its last successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// Process-stable job identifier, e.g. `"update_stock_daily"`.
    pub id: String,
    /// Cron expression this job fires on (see [`crate::scheduler::normalize_cron_expr`]).
    pub cron_expr: String,
    /// Whether this job additionally fires once right after the scheduler starts.
    pub run_on_start: bool,
    /// When this job last completed a run, if ever.
    pub last_run: Option<DateTime<Utc>>,
    /// When this job is next due to fire, if computed.
    pub next_run: Option<DateTime<Utc>>,
}

/// Typed CRUD surface over persisted [`Job`] rows.
///
/// `upsert` is idempotent-by-id: re-registering the same job id on a later
/// process start updates its cron expression in place rather than erroring,
/// so a redeployed binary can adjust a schedule without a migration.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or update a job row by `id`.
    async fn upsert(&self, job: &Job) -> Result<(), FetcherError>;

    /// Fetch one job by id, if it has ever been registered.
    async fn get(&self, id: &str) -> Result<Option<Job>, FetcherError>;

    /// All persisted jobs, in no particular order.
    async fn list(&self) -> Result<Vec<Job>, FetcherError>;

    /// Record the outcome of a completed run: updates `last_run` and the
    /// freshly computed `next_run`.
    async fn record_run(
        &self,
        id: &str,
        last_run: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<(), FetcherError>;
}

fn row_to_job_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Job, FetcherError> {
    let run_on_start: i64 = row.try_get("run_on_start").map_err(FetcherError::Repository)?;
    Ok(Job {
        id: row.try_get("id").map_err(FetcherError::Repository)?,
        cron_expr: row.try_get("cron_expr").map_err(FetcherError::Repository)?,
        run_on_start: run_on_start != 0,
        last_run: row.try_get("last_run").map_err(FetcherError::Repository)?,
        next_run: row.try_get("next_run").map_err(FetcherError::Repository)?,
    })
}

fn row_to_job_pg(row: &sqlx::postgres::PgRow) -> Result<Job, FetcherError> {
    Ok(Job {
        id: row.try_get("id").map_err(FetcherError::Repository)?,
        cron_expr: row.try_get("cron_expr").map_err(FetcherError::Repository)?,
        run_on_start: row.try_get("run_on_start").map_err(FetcherError::Repository)?,
        last_run: row.try_get("last_run").map_err(FetcherError::Repository)?,
        next_run: row.try_get("next_run").map_err(FetcherError::Repository)?,
    })
}

/// SQLite-backed [`JobStore`], for tests and local development.
pub struct SqliteJobStore {
    pool: Pool<Sqlite>,
}

impl SqliteJobStore {
    /// Wrap an already-pooled SQLite connection.
    #[must_use]
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Create the `scheduler_jobs` table if it does not already exist.
    pub async fn ensure_schema(&self) -> Result<(), FetcherError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS scheduler_jobs (
                id TEXT PRIMARY KEY,
                cron_expr TEXT NOT NULL,
                run_on_start INTEGER NOT NULL,
                last_run TEXT,
                next_run TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(FetcherError::Repository)?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn upsert(&self, job: &Job) -> Result<(), FetcherError> {
        sqlx::query(
            "INSERT INTO scheduler_jobs (id, cron_expr, run_on_start, last_run, next_run) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET cron_expr = excluded.cron_expr, run_on_start = excluded.run_on_start",
        )
        .bind(&job.id)
        .bind(&job.cron_expr)
        .bind(i64::from(job.run_on_start))
        .bind(job.last_run)
        .bind(job.next_run)
        .execute(&self.pool)
        .await
        .map_err(FetcherError::Repository)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, FetcherError> {
        let row = sqlx::query("SELECT * FROM scheduler_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(FetcherError::Repository)?;
        row.as_ref().map(row_to_job_sqlite).transpose()
    }

    async fn list(&self) -> Result<Vec<Job>, FetcherError> {
        let rows = sqlx::query("SELECT * FROM scheduler_jobs")
            .fetch_all(&self.pool)
            .await
            .map_err(FetcherError::Repository)?;
        rows.iter().map(row_to_job_sqlite).collect()
    }

    async fn record_run(
        &self,
        id: &str,
        last_run: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<(), FetcherError> {
        sqlx::query("UPDATE scheduler_jobs SET last_run = ?, next_run = ? WHERE id = ?")
            .bind(last_run)
            .bind(next_run)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(FetcherError::Repository)?;
        Ok(())
    }
}

/// Postgres-backed [`JobStore`], for deployment.
pub struct PostgresJobStore {
    pool: Pool<Postgres>,
}

impl PostgresJobStore {
    /// Wrap an already-pooled Postgres connection.
    #[must_use]
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Create the `scheduler_jobs` table if it does not already exist.
    pub async fn ensure_schema(&self) -> Result<(), FetcherError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS scheduler_jobs (
                id TEXT PRIMARY KEY,
                cron_expr TEXT NOT NULL,
                run_on_start BOOLEAN NOT NULL,
                last_run TIMESTAMPTZ,
                next_run TIMESTAMPTZ
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(FetcherError::Repository)?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn upsert(&self, job: &Job) -> Result<(), FetcherError> {
        sqlx::query(
            "INSERT INTO scheduler_jobs (id, cron_expr, run_on_start, last_run, next_run) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET cron_expr = excluded.cron_expr, run_on_start = excluded.run_on_start",
        )
        .bind(&job.id)
        .bind(&job.cron_expr)
        .bind(job.run_on_start)
        .bind(job.last_run)
        .bind(job.next_run)
        .execute(&self.pool)
        .await
        .map_err(FetcherError::Repository)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, FetcherError> {
        let row = sqlx::query("SELECT * FROM scheduler_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(FetcherError::Repository)?;
        row.as_ref().map(row_to_job_pg).transpose()
    }

    async fn list(&self) -> Result<Vec<Job>, FetcherError> {
        let rows = sqlx::query("SELECT * FROM scheduler_jobs")
            .fetch_all(&self.pool)
            .await
            .map_err(FetcherError::Repository)?;
        rows.iter().map(row_to_job_pg).collect()
    }

    async fn record_run(
        &self,
        id: &str,
        last_run: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<(), FetcherError> {
        sqlx::query("UPDATE scheduler_jobs SET last_run = $1, next_run = $2 WHERE id = $3")
            .bind(last_run)
            .bind(next_run)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(FetcherError::Repository)?;
        Ok(())
    }
}
