//! The sync worker binary: registers the recurring schedules, runs the
//! queue worker, and drains gracefully on termination signals.

use anyhow::Result;
use campaign_sync::schedule::{RetentionPolicy, ScheduleDefinition, Scheduler};
use campaign_sync::sync::SyncContext;
use campaign_sync::sync::client::{HttpPlatformClient, PlatformApiConfig};
use campaign_sync::sync::health::HealthCheckJob;
use campaign_sync::sync::instagram::InstagramSyncJob;
use campaign_sync::sync::soundcloud::SoundcloudSyncJob;
use campaign_sync::sync::spotify::SpotifySyncJob;
use campaign_sync::sync::youtube::VideoSyncJob;
use campaign_sync::{BackgroundJob as _, Runner, WorkerConfig};
use clap::Parser;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Scheduled metric-synchronization worker for campaign platforms
#[derive(Parser, Debug)]
#[command(name = "campaign-sync-worker", version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Queue backend URL; overrides DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,

    /// Entities synced concurrently within one batch (1 = sequential)
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let mut config = WorkerConfig::from_env();
    if args.database_url.is_some() {
        config.database_url = args.database_url;
    }
    if let Some(concurrency) = args.concurrency {
        config.sync_concurrency = concurrency.clamp(1, 8);
    }

    // Degraded mode: without a queue backend the worker is a no-op, and the
    // rest of the platform keeps functioning without scheduled syncs.
    let Some(database_url) = config.database_url.clone() else {
        warn!("Queue backend not configured; scheduled syncs are disabled");
        return Ok(());
    };

    let pool = match PgPool::connect(&database_url).await {
        Ok(pool) => pool,
        Err(error) => {
            error!(%error, "Queue backend unreachable; scheduled syncs are disabled");
            return Ok(());
        }
    };
    if let Err(error) = campaign_sync::setup_database(&pool).await {
        error!(%error, "Queue backend migration failed; scheduled syncs are disabled");
        return Ok(());
    }

    let api = match HttpPlatformClient::new(PlatformApiConfig::from_env()) {
        Ok(api) => api,
        Err(error) => {
            error!(%error, "Platform API client setup failed; scheduled syncs are disabled");
            return Ok(());
        }
    };

    let context = SyncContext {
        pool: pool.clone(),
        api: Arc::new(api),
        concurrency: config.sync_concurrency,
    };

    let scheduler = Scheduler::new(pool.clone());
    for definition in recurring_schedules() {
        if let Err(error) = scheduler.register(&definition).await {
            error!(schedule.name = %definition.name, %error, "Failed to register schedule");
        }
    }
    let scheduler_handle = scheduler.start();

    let runner = Runner::new(pool, context)
        .register_job_type::<VideoSyncJob>()
        .register_job_type::<SpotifySyncJob>()
        .register_job_type::<SoundcloudSyncJob>()
        .register_job_type::<InstagramSyncJob>()
        .register_job_type::<HealthCheckJob>()
        .poll_interval(config.poll_interval)
        .max_retries(config.max_retries)
        .archive_completed_jobs(true);

    let handle = runner.start();
    info!("Sync worker started");

    // Single owner for signal handling; repeated signals just re-trigger the
    // (idempotent) shutdown instead of killing the in-flight job.
    let trigger = handle.shutdown_trigger();
    tokio::spawn(async move {
        loop {
            if let Err(error) = wait_for_termination().await {
                error!(%error, "Signal handler failed");
                return;
            }
            info!("Termination signal received; draining in-flight work");
            trigger.shutdown();
        }
    });

    handle.wait_for_shutdown().await;
    scheduler_handle.abort();
    info!("Sync worker stopped");
    Ok(())
}

/// Resolves on SIGTERM or SIGINT.
async fn wait_for_termination() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigterm.recv() => {}
            result = tokio::signal::ctrl_c() => result?,
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(())
    }
}

/// The recurring schedule set, registered idempotently at every startup.
fn recurring_schedules() -> Vec<ScheduleDefinition> {
    let video = |name: &str, pattern: &str, bucket: &str| ScheduleDefinition {
        name: name.to_owned(),
        job_type: VideoSyncJob::JOB_NAME.to_owned(),
        cron_pattern: pattern.to_owned(),
        payload: json!({ "time_of_day": bucket }),
        retention: RetentionPolicy::default(),
    };

    vec![
        video("video-sync-morning", "0 8 * * *", "morning"),
        video("video-sync-afternoon", "0 14 * * *", "afternoon"),
        video("video-sync-evening", "0 20 * * *", "evening"),
        ScheduleDefinition {
            name: "spotify-sync-hourly".to_owned(),
            job_type: SpotifySyncJob::JOB_NAME.to_owned(),
            cron_pattern: "0 * * * *".to_owned(),
            payload: json!({}),
            retention: RetentionPolicy::default(),
        },
        ScheduleDefinition {
            name: "soundcloud-sync-hourly".to_owned(),
            job_type: SoundcloudSyncJob::JOB_NAME.to_owned(),
            cron_pattern: "30 * * * *".to_owned(),
            payload: json!({}),
            retention: RetentionPolicy::default(),
        },
        ScheduleDefinition {
            name: "instagram-sync-daily".to_owned(),
            job_type: InstagramSyncJob::JOB_NAME.to_owned(),
            cron_pattern: "15 6 * * *".to_owned(),
            payload: json!({}),
            retention: RetentionPolicy::default(),
        },
        ScheduleDefinition {
            name: "queue-health-hourly".to_owned(),
            job_type: HealthCheckJob::JOB_NAME.to_owned(),
            cron_pattern: "45 * * * *".to_owned(),
            payload: json!({}),
            retention: RetentionPolicy {
                keep_completed: 5,
                keep_failed: 20,
            },
        },
    ]
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {e}"))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // The worker dispatches by deserializing the stored payload; a schedule
    // whose payload its own handler rejects would burn the retry budget on
    // every fire.
    #[test]
    fn every_schedule_payload_deserializes_into_its_job_type() {
        for schedule in recurring_schedules() {
            let payload = schedule.payload.clone();
            let result = match schedule.job_type.as_str() {
                VideoSyncJob::JOB_NAME => {
                    serde_json::from_value::<VideoSyncJob>(payload).map(|_| ())
                }
                SpotifySyncJob::JOB_NAME => {
                    serde_json::from_value::<SpotifySyncJob>(payload).map(|_| ())
                }
                SoundcloudSyncJob::JOB_NAME => {
                    serde_json::from_value::<SoundcloudSyncJob>(payload).map(|_| ())
                }
                InstagramSyncJob::JOB_NAME => {
                    serde_json::from_value::<InstagramSyncJob>(payload).map(|_| ())
                }
                HealthCheckJob::JOB_NAME => {
                    serde_json::from_value::<HealthCheckJob>(payload).map(|_| ())
                }
                other => panic!("schedule {} has unknown job type {other}", schedule.name),
            };

            assert!(
                result.is_ok(),
                "schedule {} enqueues a payload its handler rejects: {result:?}",
                schedule.name
            );
        }
    }
}
