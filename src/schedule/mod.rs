//! Recurring schedule registration and triggering.
//!
//! A schedule is a durable row keyed by name: re-registering the same
//! definition updates the row instead of creating a second trigger. A
//! background tick loop turns due schedules into deduplicated job instances
//! on the queue.

pub mod cron;

use crate::background_job::enqueue_job_tx;
use crate::schedule::cron::{CronPattern, CronPatternError};
use chrono::Utc;
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use thiserror::Error;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Errors from schedule registration or triggering.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The calendar pattern could not be parsed.
    #[error(transparent)]
    Pattern(#[from] CronPatternError),

    /// The queue backend rejected the operation.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// How many finished job records to keep around per schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum retained completed instances.
    pub keep_completed: i64,
    /// Maximum retained failed instances.
    pub keep_failed: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_completed: 20,
            keep_failed: 50,
        }
    }
}

/// A recurring job definition registered at process startup.
#[derive(Debug, Clone)]
pub struct ScheduleDefinition {
    /// Unique schedule name; the idempotency key for registration.
    pub name: String,
    /// Job type the schedule enqueues (a [`crate::BackgroundJob::JOB_NAME`]).
    pub job_type: String,
    /// Five-field cron pattern.
    pub cron_pattern: String,
    /// Default payload for enqueued instances.
    pub payload: Value,
    /// Retention limits for finished instances of this schedule.
    pub retention: RetentionPolicy,
}

#[derive(Debug, FromRow)]
struct DueSchedule {
    name: String,
    job_type: String,
    cron_pattern: String,
    payload: Value,
}

/// Registers recurring job definitions and enqueues due instances.
pub struct Scheduler {
    pool: PgPool,
}

impl Scheduler {
    /// Create a scheduler on top of the queue backend pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a recurring job definition.
    ///
    /// Safe to call repeatedly with the same definition: the trigger row is
    /// upserted by name, so re-registration updates rather than duplicates.
    /// A pending `next_run_at` is preserved when the pattern is unchanged so
    /// restarts do not postpone an imminent fire.
    pub async fn register(&self, definition: &ScheduleDefinition) -> Result<(), ScheduleError> {
        let pattern = CronPattern::parse(&definition.cron_pattern)?;
        let next_run_at = pattern.next_after(Utc::now());

        sqlx::query(
            r"
            INSERT INTO scheduled_jobs
                (name, job_type, cron_pattern, payload, keep_completed, keep_failed, next_run_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (name) DO UPDATE SET
                job_type = EXCLUDED.job_type,
                cron_pattern = EXCLUDED.cron_pattern,
                payload = EXCLUDED.payload,
                keep_completed = EXCLUDED.keep_completed,
                keep_failed = EXCLUDED.keep_failed,
                next_run_at = CASE
                    WHEN scheduled_jobs.cron_pattern = EXCLUDED.cron_pattern
                        THEN scheduled_jobs.next_run_at
                    ELSE EXCLUDED.next_run_at
                END,
                updated_at = NOW()
            ",
        )
        .bind(&definition.name)
        .bind(&definition.job_type)
        .bind(&definition.cron_pattern)
        .bind(&definition.payload)
        .bind(definition.retention.keep_completed)
        .bind(definition.retention.keep_failed)
        .bind(next_run_at)
        .execute(&self.pool)
        .await?;

        info!(
            schedule.name = %definition.name,
            schedule.pattern = %definition.cron_pattern,
            "Registered recurring schedule"
        );
        Ok(())
    }

    /// Start the tick loop that fires due schedules.
    pub fn start(self) -> AbortHandle {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(error) = self.tick().await {
                    warn!(%error, "Schedule tick failed");
                }
            }
        });
        task.abort_handle()
    }

    /// Enqueue one job instance per due schedule and advance its fire time.
    ///
    /// Returns the number of schedules that fired. Rows are taken with
    /// `FOR UPDATE SKIP LOCKED`, so overlapping worker processes never fire
    /// the same schedule twice, and the enqueue itself is deduplicated
    /// against identical still-pending instances.
    pub async fn tick(&self) -> Result<usize, ScheduleError> {
        let mut tx = self.pool.begin().await?;

        let due = sqlx::query_as::<_, DueSchedule>(
            r"
            SELECT name, job_type, cron_pattern, payload
            FROM scheduled_jobs
            WHERE next_run_at IS NOT NULL AND next_run_at <= NOW()
            ORDER BY next_run_at ASC
            FOR UPDATE SKIP LOCKED
            ",
        )
        .fetch_all(&mut *tx)
        .await?;

        for schedule in &due {
            let job_id = enqueue_job_tx(&mut tx, &schedule.job_type, &schedule.payload, 0).await?;
            match job_id {
                Some(job_id) => {
                    debug!(
                        schedule.name = %schedule.name,
                        job.id = job_id,
                        "Enqueued recurring job instance"
                    );
                }
                None => {
                    debug!(
                        schedule.name = %schedule.name,
                        "Identical instance already pending; not enqueued again"
                    );
                }
            }

            let next_run_at = CronPattern::parse(&schedule.cron_pattern)
                .ok()
                .and_then(|pattern| pattern.next_after(Utc::now()));
            if next_run_at.is_none() {
                warn!(
                    schedule.name = %schedule.name,
                    "Schedule has no future fire time; disabling it"
                );
            }

            sqlx::query(
                r"
                UPDATE scheduled_jobs
                SET next_run_at = $2, last_enqueued_at = NOW(), updated_at = NOW()
                WHERE name = $1
                ",
            )
            .bind(&schedule.name)
            .bind(next_run_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(due.len())
    }
}
