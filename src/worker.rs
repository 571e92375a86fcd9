use crate::job_registry::JobRegistry;
use crate::schema::JobOutcome;
use crate::storage;
use crate::util::{try_to_extract_panic_info, with_sentry_transaction};
use futures_util::FutureExt;
use rand::Rng;
use sentry_core::{Hub, SentryFutureExt};
use sqlx::PgPool;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

pub(crate) struct Worker<Context> {
    pub(crate) connection_pool: PgPool,
    pub(crate) context: Context,
    pub(crate) job_registry: Arc<JobRegistry<Context>>,
    pub(crate) shutdown_when_queue_empty: bool,
    pub(crate) poll_interval: Duration,
    pub(crate) jitter: Duration,
    pub(crate) archive_completed_jobs: bool,
    pub(crate) max_retries: i32,
    pub(crate) shutdown_rx: watch::Receiver<bool>,
}

impl<Context: Clone + Send + Sync + 'static> Worker<Context> {
    /// Calculate the sleep duration with random jitter applied.
    fn sleep_duration_with_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.poll_interval;
        }

        let jitter_millis = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let random_jitter = rand::thread_rng().gen_range(0..=jitter_millis);
        self.poll_interval + Duration::from_millis(random_jitter)
    }

    /// Run background jobs until shutdown is requested, or until the queue is
    /// empty if `shutdown_when_queue_empty` is set.
    ///
    /// The shutdown signal is only observed between jobs; an in-flight job
    /// always runs to completion before the loop exits.
    #[allow(clippy::cognitive_complexity)]
    pub(crate) async fn run(&self) {
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            if *shutdown_rx.borrow() {
                info!("Shutdown requested. Stopping the worker…");
                break;
            }

            match self.run_next_job().await {
                Ok(Some(_)) => {}
                Ok(None) if self.shutdown_when_queue_empty => {
                    debug!("No pending background worker jobs found. Shutting down the worker…");
                    break;
                }
                Ok(None) => {
                    let sleep_duration = self.sleep_duration_with_jitter();
                    trace!(
                        "No pending background worker jobs found. Polling again in {sleep_duration:?}…",
                    );
                    tokio::select! {
                        () = sleep(sleep_duration) => {}
                        _ = shutdown_rx.changed() => {}
                    }
                }
                Err(error) => {
                    error!("Failed to run job: {error}");
                    tokio::select! {
                        () = sleep(self.sleep_duration_with_jitter()) => {}
                        _ = shutdown_rx.changed() => {}
                    }
                }
            }
        }
    }

    /// Run the next job in the queue, if there is one.
    ///
    /// Returns:
    /// - `Ok(Some(job_id))` if a job was run (or dropped as unknown)
    /// - `Ok(None)` if no jobs were waiting
    /// - `Err(...)` if there was an error retrieving the job
    #[allow(clippy::cognitive_complexity)]
    async fn run_next_job(&self) -> anyhow::Result<Option<i64>> {
        let context = self.context.clone();
        let pool = &self.connection_pool;

        trace!("Looking for next background worker job…");

        // Start a transaction to hold the job lock during execution
        let mut tx = pool.begin().await?;

        let job = match storage::find_next_unlocked_job_tx(&mut tx).await {
            Ok(job) => job,
            Err(sqlx::Error::RowNotFound) => {
                tx.rollback().await?;
                return Ok(None);
            }
            Err(e) => {
                tx.rollback().await?;
                return Err(e.into());
            }
        };

        let span = info_span!("job", job.id = %job.id, job.type = %job.job_type);
        let job_id = job.id;
        let retries = job.retries;

        // An unrecognized type means a deploy-order mismatch, not a failure:
        // log once and drop the row rather than retrying it forever.
        let Some(run_task_fn) = self.job_registry.get(&job.job_type) else {
            let _enter = span.enter();
            warn!(job.r#type = %job.job_type, "Unknown job type. Skipping the job…");
            storage::delete_job(&mut tx, job_id).await?;
            tx.commit().await?;
            return Ok(Some(job_id));
        };
        let run_task_fn = Arc::clone(run_task_fn);

        debug!("Running job…");

        let future = with_sentry_transaction(&job.job_type, || {
            let job_future = run_task_fn(context, job.data.clone());
            async move {
                AssertUnwindSafe(job_future)
                    .catch_unwind()
                    .await
                    .map_err(|e| try_to_extract_panic_info(&*e))
                    // TODO: Replace with flatten() once that stabilizes
                    .and_then(std::convert::identity)
            }
        });

        let result = future
            .instrument(span.clone())
            .bind_hub(Hub::current())
            .await;

        let _enter = span.enter();
        match result {
            Ok(()) => {
                info!("Job completed");
                if self.archive_completed_jobs {
                    debug!("Archiving successful job…");
                    storage::archive_finished_job(&mut tx, job_id, JobOutcome::Completed).await?;
                } else {
                    debug!("Deleting successful job…");
                    storage::delete_job(&mut tx, job_id).await?;
                }
                tx.commit().await?;
            }
            Err(error) => {
                error!("Failed to run job: {error}");
                if retries + 1 >= self.max_retries {
                    warn!("Retry budget exhausted. Archiving the job as failed…");
                    storage::archive_finished_job(&mut tx, job_id, JobOutcome::Failed).await?;
                } else {
                    storage::update_failed_job(&mut tx, job_id).await?;
                }
                tx.commit().await?;
            }
        }

        Ok(Some(job_id))
    }
}
