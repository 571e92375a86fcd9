use crate::schema::JobOutcome;
use crate::storage;
use sqlx::PgPool;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Prunes archived job records beyond the retention limits configured on the
/// recurring schedules, newest records kept.
pub struct Cleaner {
    pool: PgPool,
}

impl Cleaner {
    /// Create a cleaner on top of the queue backend pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(crate) fn start(self) -> AbortHandle {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(error) = self.sweep().await {
                    warn!(%error, "Archived job cleanup failed");
                }
            }
        });
        task.abort_handle()
    }

    /// Run one pruning pass over every job type with a registered schedule.
    /// The runner calls this periodically; it is also usable directly for an
    /// ad-hoc cleanup.
    pub async fn sweep(&self) -> Result<(), sqlx::Error> {
        // Several schedules may enqueue the same job type (the video sync has
        // one schedule per time-of-day), so take the widest limit per type.
        let policies = sqlx::query_as::<_, (String, i64, i64)>(
            r"
            SELECT job_type, MAX(keep_completed), MAX(keep_failed)
            FROM scheduled_jobs
            GROUP BY job_type
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        for (job_type, keep_completed, keep_failed) in policies {
            let pruned = storage::prune_archived_jobs(
                &self.pool,
                &job_type,
                JobOutcome::Completed,
                keep_completed,
            )
            .await?
                + storage::prune_archived_jobs(&self.pool, &job_type, JobOutcome::Failed, keep_failed)
                    .await?;

            if pruned > 0 {
                debug!(job.r#type = %job_type, pruned, "Pruned archived job records");
            }
        }

        Ok(())
    }
}
