//! tradinglab-scheduler: durable, cron-driven refresh jobs (§4.6) that drive
//! the router and the daily-bar cache service over the full symbol universe.
//!
//! Overview
//! - `job`: the persisted [`Job`] record and the [`JobStore`] trait (SQLite
//!   and Postgres backends), so a restarted process recovers its triggers.
//! - `scheduler::Scheduler`: one dispatcher task per registered job, parsing
//!   its cron expression with the `cron` crate and sleeping until the next
//!   occurrence in the configured timezone (`Asia/Shanghai` by default).
//! - `builtins`: the two jobs named in §4.6, `update_stock_basic_info` and
//!   `update_stock_daily`, as [`JobHandler`] factories ready to register.
//!
//! Key behaviors and trade-offs
//! - No external scheduler crate: a hand-rolled dispatcher loop per job,
//!   following §9's own documented fallback, avoids pulling in a store-backed
//!   scheduler whose API this workspace would otherwise have to bend around.
//! - `run_on_start` never fires inline during [`Scheduler::add_job`] — it is
//!   deferred to a one-shot task spawned from [`Scheduler::start`], per the
//!   REDESIGN FLAGS note about registering against a still-initializing
//!   event loop.
//! - Misfire recovery: on `start`, a job whose persisted `next_run` has
//!   already passed by less than `misfire_grace` (30s default) fires once
//!   immediately before falling back to its normal schedule.
//! - `shutdown` signals every dispatcher loop to stop after its current run
//!   and waits for all of them to exit before returning.
#![warn(missing_docs)]

/// Persisted job record and its SQLite/Postgres-backed store.
pub mod job;
/// The cron dispatcher itself.
pub mod scheduler;

/// The two built-in refresh jobs.
pub mod builtins;

pub use job::{Job, JobStore, PostgresJobStore, SqliteJobStore};
pub use scheduler::{JobHandler, Scheduler};
