//! Maintenance handler: periodic queue and datastore health check.

use crate::BackgroundJob;
use crate::storage;
use crate::sync::SyncContext;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Verifies datastore liveness and reports queue depth. Purely
/// observational; its output is consumed from the logs.
// Braced, not a unit struct: the scheduled `{}` payload must deserialize.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct HealthCheckJob {}

impl BackgroundJob for HealthCheckJob {
    const JOB_NAME: &'static str = "queue_health_check";
    const DEDUPLICATED: bool = true;
    type Context = SyncContext;

    async fn run(&self, ctx: Self::Context) -> anyhow::Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&ctx.pool)
            .await?;

        let pending = storage::pending_job_count(&ctx.pool).await?;
        let retried = storage::failed_job_count(&ctx.pool).await?;

        if retried > 0 {
            warn!(
                queue.pending = pending,
                queue.retried = retried,
                "Queue health check passed, with jobs awaiting retry"
            );
        } else {
            info!(
                queue.pending = pending,
                "Queue health check passed"
            );
        }

        Ok(())
    }
}
