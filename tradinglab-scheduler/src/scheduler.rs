//! [`Scheduler`]: durable, cron-driven job dispatch (§4.6).
//!
//! Grounded in §9's own fallback suggestion ("persist `(id, cron, next_run)`
//! rows directly and run a dispatcher task that wakes on the nearest
//! `next_run`") rather than an external scheduler crate: one dispatcher task
//! per job computes its next fire time from a parsed [`cron::Schedule`] in
//! the configured timezone, sleeps until then, runs the handler, and
//! persists the outcome through a [`JobStore`].

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tradinglab_core::FetcherError;
use tradinglab_types::SchedulerConfig;

#[cfg(feature = "tracing")]
use tracing::{error, info, warn};

use crate::job::{Job, JobStore};

/// A job's callable: returns a boxed future so [`Scheduler::add_job`] can
/// accept both plain async closures and values captured from `builtins`.
pub type JobHandler = Arc<dyn Fn() -> BoxFuture<'static, Result<(), FetcherError>> + Send + Sync>;

/// The source system's unix-style 5-field cron expressions (minute hour
/// day-of-month month day-of-week) omit seconds; the `cron` crate requires a
/// leading seconds field. A 5-field expression is widened to 6 fields with
/// `sec = 0`; anything else (already 6 or 7 fields) passes through unchanged.
///
/// The unix day-of-week field (`0`/`7` = Sunday .. `6` = Saturday) is also
/// rewritten to three-letter names (`SUN`..`SAT`) before widening: the
/// `cron` crate's own numbering for that field is Quartz-style rather than
/// unix, so a bare numeric range like `1-5` would silently mean a different
/// set of weekdays than the source system's `1-5` (Mon-Fri). Names sidestep
/// the ambiguity entirely.
#[must_use]
pub fn normalize_cron_expr(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return expr.to_string();
    }
    let mut fields = fields;
    let dow = translate_unix_dow_field(fields[4]);
    fields[4] = &dow;
    format!("0 {}", fields.join(" "))
}

fn unix_dow_name(n: u32) -> &'static str {
    match n % 7 {
        0 | 7 => "SUN",
        1 => "MON",
        2 => "TUE",
        3 => "WED",
        4 => "THU",
        5 => "FRI",
        _ => "SAT",
    }
}

/// Rewrite a unix-style day-of-week field (numeric, possibly with `,` lists
/// and `-` ranges) into day names. Fields that already contain letters (or
/// are a bare `*`) pass through unchanged.
fn translate_unix_dow_field(field: &str) -> String {
    if field == "*" || field.chars().any(char::is_alphabetic) {
        return field.to_string();
    }
    field
        .split(',')
        .map(|part| match part.split_once('-') {
            Some((lo, hi)) => match (lo.parse::<u32>(), hi.parse::<u32>()) {
                (Ok(lo), Ok(hi)) => format!("{}-{}", unix_dow_name(lo), unix_dow_name(hi)),
                _ => part.to_string(),
            },
            None => part
                .parse::<u32>()
                .map_or_else(|_| part.to_string(), |n| unix_dow_name(n).to_string()),
        })
        .collect::<Vec<_>>()
        .join(",")
}

struct JobEntry {
    job: Job,
    schedule: Schedule,
    handler: JobHandler,
}

/// Durable cron dispatcher: `add_job` registers and persists a trigger,
/// `start` spawns one dispatcher task per job (plus a one-shot immediate
/// fire for `run_on_start` jobs), `shutdown` signals every task to stop
/// after its current run and waits for them to exit.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    config: SchedulerConfig,
    tz: Tz,
    entries: StdMutex<HashMap<String, JobEntry>>,
    handles: StdMutex<Vec<JoinHandle<()>>>,
    stop_tx: watch::Sender<bool>,
    started: StdMutex<bool>,
}

impl Scheduler {
    /// Build a scheduler persisting job state through `store`, using
    /// `config` for the timezone and misfire-grace window.
    ///
    /// # Errors
    /// Returns [`FetcherError::InvalidCron`] if `config.timezone` is not a
    /// recognized IANA timezone name.
    pub fn new(store: Arc<dyn JobStore>, config: SchedulerConfig) -> Result<Self, FetcherError> {
        let tz: Tz = config.timezone.parse().map_err(|_| FetcherError::InvalidCron {
            expr: config.timezone.clone(),
            msg: "unrecognized IANA timezone".to_string(),
        })?;
        let (stop_tx, _) = watch::channel(false);
        Ok(Self {
            store,
            config,
            tz,
            entries: StdMutex::new(HashMap::new()),
            handles: StdMutex::new(Vec::new()),
            stop_tx,
            started: StdMutex::new(false),
        })
    }

    /// Register a job under `id`, persisting its trigger durably.
    ///
    /// Re-registering the same `id` within one process is rejected with
    /// [`FetcherError::DuplicateJob`]; re-registering the same `id` across a
    /// process restart is expected and updates the stored cron expression
    /// in place (§9 "Global registry" idempotent-by-name convention, applied
    /// here to job ids).
    ///
    /// `run_on_start` does not invoke `handler` here — doing so before
    /// [`Scheduler::start`] risks running against a still-initializing
    /// runtime (§9 REDESIGN FLAGS). It is recorded and fired as a one-shot
    /// task once [`Scheduler::start`] actually runs.
    ///
    /// # Errors
    /// Returns [`FetcherError::InvalidCron`] if `cron_expr` does not parse,
    /// or [`FetcherError::DuplicateJob`] on a same-process re-registration.
    pub async fn add_job(
        &self,
        id: impl Into<String>,
        cron_expr: impl Into<String>,
        run_on_start: bool,
        handler: JobHandler,
    ) -> Result<(), FetcherError> {
        let id = id.into();
        let cron_expr = cron_expr.into();

        if self.entries.lock().expect("mutex poisoned").contains_key(&id) {
            return Err(FetcherError::DuplicateJob { job_id: id });
        }

        let normalized = normalize_cron_expr(&cron_expr);
        let schedule = Schedule::from_str(&normalized).map_err(|e| FetcherError::InvalidCron {
            expr: cron_expr.clone(),
            msg: e.to_string(),
        })?;
        let next_run = schedule.upcoming(self.tz).next().map(|dt| dt.with_timezone(&Utc));

        let existing = self.store.get(&id).await?;
        let job = Job {
            id: id.clone(),
            cron_expr,
            run_on_start,
            last_run: existing.and_then(|j| j.last_run),
            next_run,
        };
        self.store.upsert(&job).await?;

        self.entries
            .lock()
            .expect("mutex poisoned")
            .insert(id, JobEntry { job, schedule, handler });
        Ok(())
    }

    /// Start dispatching every registered job. Idempotent: a second call
    /// while already started is a no-op.
    pub fn start(&self) {
        {
            let mut started = self.started.lock().expect("mutex poisoned");
            if *started {
                return;
            }
            *started = true;
        }

        let entries: Vec<(String, Schedule, JobHandler, bool, Option<DateTime<Utc>>)> = self
            .entries
            .lock()
            .expect("mutex poisoned")
            .iter()
            .map(|(id, e)| (id.clone(), e.schedule.clone(), e.handler.clone(), e.job.run_on_start, e.job.next_run))
            .collect();

        let mut handles = self.handles.lock().expect("mutex poisoned");
        for (id, schedule, handler, run_on_start, stored_next_run) in entries {
            if run_on_start {
                #[cfg(feature = "tracing")]
                info!(job = %id, "run_on_start: scheduling one-shot immediate fire");
                let store = self.store.clone();
                let handler_clone = handler.clone();
                let job_id = id.clone();
                handles.push(tokio::spawn(async move {
                    run_once(&job_id, &handler_clone, &store, None).await;
                }));
            }

            // Misfire recovery: a next_run that has already passed, but by
            // less than the grace window, still fires once immediately.
            if let Some(due) = stored_next_run {
                let now = Utc::now();
                if due <= now {
                    let overdue = now - due;
                    if overdue.to_std().map(|d| d <= self.config.misfire_grace).unwrap_or(false) {
                        #[cfg(feature = "tracing")]
                        warn!(job = %id, "recovering missed fire within misfire grace window");
                        let store = self.store.clone();
                        let handler_clone = handler.clone();
                        let job_id = id.clone();
                        handles.push(tokio::spawn(async move {
                            run_once(&job_id, &handler_clone, &store, None).await;
                        }));
                    }
                }
            }

            let store = self.store.clone();
            let stop = self.stop_tx.subscribe();
            let tz = self.tz;
            handles.push(tokio::spawn(dispatch_loop(id, schedule, handler, store, tz, stop)));
        }
    }

    /// Signal every dispatcher loop to stop after its in-flight run
    /// completes, then wait for all of them to exit. Idempotent.
    ///
    /// Uses a `watch` channel rather than `Notify`: a dispatcher mid-`run_once`
    /// or still computing its next fire time is not parked in `notified()`
    /// when this is called, and `Notify::notify_waiters` would silently drop
    /// the signal for it. `watch::Receiver::changed` observes a value that
    /// changed before the receiver started watching, so no wakeup is lost.
    pub async fn shutdown(&self) {
        let _ = self.stop_tx.send(true);
        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().expect("mutex poisoned");
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Snapshot of every registered job's persisted state.
    ///
    /// # Errors
    /// Propagates [`FetcherError::Repository`] from the underlying store.
    pub async fn jobs(&self) -> Result<Vec<Job>, FetcherError> {
        self.store.list().await
    }
}

async fn dispatch_loop(
    id: String,
    schedule: Schedule,
    handler: JobHandler,
    store: Arc<dyn JobStore>,
    tz: Tz,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow() {
            return;
        }

        let Some(next) = schedule.upcoming(tz).next() else {
            #[cfg(feature = "tracing")]
            error!(job = %id, "cron schedule produced no further occurrences");
            return;
        };
        let now = chrono::Utc::now().with_timezone(&tz);
        let wait = (next - now).to_std().unwrap_or(std::time::Duration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = stop.changed() => return,
        }
        if *stop.borrow() {
            return;
        }

        let next_run = schedule.upcoming(tz).next().map(|dt| dt.with_timezone(&Utc));
        run_once(&id, &handler, &store, next_run).await;
    }
}

async fn run_once(id: &str, handler: &JobHandler, store: &Arc<dyn JobStore>, next_run: Option<DateTime<Utc>>) {
    #[cfg(feature = "tracing")]
    info!(job = %id, "job run starting");
    let result = handler().await;
    let now = Utc::now();
    if let Err(_err) = store.record_run(id, now, next_run).await {
        #[cfg(feature = "tracing")]
        error!(job = %id, error = %_err, "failed to persist job run outcome");
    }
    match result {
        Ok(()) => {
            #[cfg(feature = "tracing")]
            info!(job = %id, "job run completed");
        }
        Err(_err) => {
            #[cfg(feature = "tracing")]
            error!(job = %id, error = %_err, "job run failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use crate::job::SqliteJobStore;

    async fn sqlite_store() -> Arc<SqliteJobStore> {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        let store = SqliteJobStore::new(pool);
        store.ensure_schema().await.unwrap();
        Arc::new(store)
    }

    #[test]
    fn normalize_widens_five_field_expressions_and_names_weekdays() {
        assert_eq!(normalize_cron_expr("0 16 * * 1-5"), "0 0 16 * * MON-FRI");
    }

    #[test]
    fn normalize_leaves_wildcard_dow_alone() {
        assert_eq!(normalize_cron_expr("0 0 * * *"), "0 0 0 * * *");
    }

    #[test]
    fn normalize_leaves_six_field_expressions_alone() {
        assert_eq!(normalize_cron_expr("0 0 16 * * 1-5"), "0 0 16 * * 1-5");
    }

    #[test]
    fn translate_dow_handles_lists_and_single_days() {
        assert_eq!(translate_unix_dow_field("1,3,5"), "MON,WED,FRI");
        assert_eq!(translate_unix_dow_field("0"), "SUN");
        assert_eq!(translate_unix_dow_field("7"), "SUN");
    }

    #[tokio::test]
    async fn add_job_persists_trigger_and_rejects_duplicate() {
        let store = sqlite_store().await;
        let scheduler = Scheduler::new(store.clone(), SchedulerConfig::default()).unwrap();
        let handler: JobHandler = Arc::new(|| Box::pin(async { Ok(()) }));

        scheduler.add_job("j1", "0 0 * * *", false, handler.clone()).await.unwrap();
        let persisted = store.get("j1").await.unwrap().unwrap();
        assert_eq!(persisted.cron_expr, "0 0 * * *");
        assert!(persisted.next_run.is_some());

        let err = scheduler.add_job("j1", "0 0 * * *", false, handler).await.unwrap_err();
        assert!(matches!(err, FetcherError::DuplicateJob { .. }));
    }

    #[tokio::test]
    async fn invalid_cron_expression_is_rejected() {
        let store = sqlite_store().await;
        let scheduler = Scheduler::new(store, SchedulerConfig::default()).unwrap();
        let handler: JobHandler = Arc::new(|| Box::pin(async { Ok(()) }));
        let err = scheduler.add_job("bad", "not a cron", false, handler).await.unwrap_err();
        assert!(matches!(err, FetcherError::InvalidCron { .. }));
    }

    #[tokio::test]
    async fn run_on_start_fires_once_without_waiting_for_the_schedule() {
        let store = sqlite_store().await;
        let scheduler = Scheduler::new(store, SchedulerConfig::default()).unwrap();
        let runs = Arc::new(AtomicU32::new(0));
        let runs_clone = runs.clone();
        let handler: JobHandler = Arc::new(move || {
            let runs = runs_clone.clone();
            Box::pin(async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        // A schedule far in the future so only the run_on_start fire happens
        // in this test's short window.
        scheduler.add_job("rof", "0 0 1 1 *", true, handler).await.unwrap();
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.shutdown().await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let store = sqlite_store().await;
        let scheduler = Scheduler::new(store, SchedulerConfig::default()).unwrap();
        scheduler.start();
        scheduler.shutdown().await;
        scheduler.shutdown().await;
    }
}
