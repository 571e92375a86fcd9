use crate::BackgroundJob;
use crate::cleaner::Cleaner;
use crate::job_registry::JobRegistry;
use crate::worker::Worker;
use futures_util::future::join_all;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{Instrument, info, info_span, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_JITTER: Duration = Duration::from_millis(100);
const DEFAULT_MAX_RETRIES: i32 = 5;

/// The core runner responsible for locking and running jobs.
///
/// This is an explicit configuration object constructed at startup; callers
/// that find no queue backend configured simply never build one.
pub struct Runner<Context: Clone + Send + Sync + 'static> {
    connection_pool: PgPool,
    job_registry: JobRegistry<Context>,
    context: Context,
    num_workers: usize,
    poll_interval: Duration,
    jitter: Duration,
    max_retries: i32,
    archive_completed_jobs: bool,
    shutdown_when_queue_empty: bool,
}

impl<Context: std::fmt::Debug + Clone + Sync + Send + 'static> std::fmt::Debug for Runner<Context> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("job_types", &self.job_registry.job_types())
            .field("context", &self.context)
            .field("num_workers", &self.num_workers)
            .field("shutdown_when_queue_empty", &self.shutdown_when_queue_empty)
            .finish()
    }
}

impl<Context: Clone + Send + Sync + 'static> Runner<Context> {
    /// Create a new runner with the given connection pool and context.
    pub fn new(connection_pool: PgPool, context: Context) -> Self {
        Self {
            connection_pool,
            job_registry: JobRegistry::default(),
            context,
            num_workers: 1,
            poll_interval: DEFAULT_POLL_INTERVAL,
            jitter: DEFAULT_JITTER,
            max_retries: DEFAULT_MAX_RETRIES,
            archive_completed_jobs: false,
            shutdown_when_queue_empty: false,
        }
    }

    /// Register a job type so the worker can dispatch instances of it.
    pub fn register_job_type<J: BackgroundJob<Context = Context>>(mut self) -> Self {
        self.job_registry.register::<J>();
        self
    }

    /// Set the number of concurrent workers. Defaults to 1, matching the
    /// one-job-at-a-time delivery model of the sync pipeline.
    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    /// Set how often workers poll for new jobs.
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the maximum random jitter added to poll intervals.
    ///
    /// Jitter helps reduce thundering herd effects when multiple workers
    /// poll for jobs simultaneously.
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set how many attempts a job gets before it is archived as failed.
    pub fn max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Archive completed jobs instead of deleting them, and start the
    /// retention cleaner alongside the workers.
    pub fn archive_completed_jobs(mut self, archive: bool) -> Self {
        self.archive_completed_jobs = archive;
        self
    }

    /// Set the runner to shut down when the background job queue is empty.
    pub fn shutdown_when_queue_empty(mut self) -> Self {
        self.shutdown_when_queue_empty = true;
        self
    }

    /// Start the background workers.
    ///
    /// This returns a [`RunHandle`] which can be used to trigger a graceful
    /// shutdown and to wait for the workers to stop.
    pub fn start(&self) -> RunHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let job_registry = Arc::new(self.job_registry.clone());

        let mut handles = Vec::new();
        for i in 1..=self.num_workers {
            let name = format!("background-worker-{i}");
            info!(worker.name = %name, "Starting worker…");

            let worker = Worker {
                connection_pool: self.connection_pool.clone(),
                context: self.context.clone(),
                job_registry: job_registry.clone(),
                shutdown_when_queue_empty: self.shutdown_when_queue_empty,
                poll_interval: self.poll_interval,
                jitter: self.jitter,
                archive_completed_jobs: self.archive_completed_jobs,
                max_retries: self.max_retries,
                shutdown_rx: shutdown_rx.clone(),
            };

            let span = info_span!("worker", worker.name = %name);
            let handle = tokio::spawn(async move { worker.run().instrument(span).await });

            handles.push(handle);
        }

        let cleaner = self
            .archive_completed_jobs
            .then(|| Cleaner::new(self.connection_pool.clone()).start());

        RunHandle {
            handles,
            shutdown: ShutdownHandle {
                shutdown_tx: Arc::new(shutdown_tx),
            },
            cleaner,
        }
    }
}

/// Cloneable trigger that asks the workers to stop after their in-flight job.
///
/// Triggering is idempotent: the signal-handling task can call
/// [`shutdown`](Self::shutdown) on every received signal without side effects
/// beyond the first.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Request a graceful shutdown.
    pub fn shutdown(&self) {
        // Send only fails when every worker already exited, which is fine.
        let _ = self.shutdown_tx.send(true);
    }
}

/// Handle to a running background job processing system
#[derive(Debug)]
pub struct RunHandle {
    handles: Vec<JoinHandle<()>>,
    shutdown: ShutdownHandle,
    cleaner: Option<AbortHandle>,
}

impl RunHandle {
    /// A cloneable shutdown trigger, usable from a signal-handling task.
    pub fn shutdown_trigger(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Request a graceful shutdown of all workers.
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Wait for all background workers to shut down.
    pub async fn wait_for_shutdown(self) {
        join_all(self.handles).await.into_iter().for_each(|result| {
            if let Err(error) = result {
                warn!(%error, "Background worker task panicked");
            }
        });

        if let Some(cleaner) = self.cleaner {
            cleaner.abort();
        }
    }
}
