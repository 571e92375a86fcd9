#![allow(missing_docs)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]

use campaign_sync::schedule::{RetentionPolicy, ScheduleDefinition, Scheduler};
use campaign_sync::{BackgroundJob, Cleaner, Runner, archived_job_count, get_archived_jobs};
use claims::{assert_none, assert_some};
use insta::assert_compact_json_snapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::Barrier;

/// Test utilities and common setup
mod test_utils {
    use super::*;
    use testcontainers::runners::AsyncRunner;

    /// Set up a test database with `TestContainers` and return the pool and container
    pub(super) async fn setup_test_db() -> anyhow::Result<(PgPool, ContainerAsync<Postgres>)> {
        let postgres_image = Postgres::default();
        let container = postgres_image.start().await?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(5432).await?;
        let connection_string = format!("postgresql://postgres:postgres@{host}:{port}/postgres");

        let pool = PgPool::connect(&connection_string).await?;
        campaign_sync::setup_database(&pool).await?;

        Ok((pool, container))
    }
}

async fn all_jobs(pool: &PgPool) -> sqlx::Result<Vec<(String, Value)>> {
    sqlx::query_as("SELECT job_type, data FROM background_jobs ORDER BY id")
        .fetch_all(pool)
        .await
}

async fn remaining_jobs(pool: &PgPool) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM background_jobs")
        .fetch_one(pool)
        .await
}

#[tokio::test]
async fn jobs_are_deleted_when_successfully_run() -> anyhow::Result<()> {
    #[derive(Serialize, Deserialize)]
    struct TestJob;

    impl BackgroundJob for TestJob {
        const JOB_NAME: &'static str = "test";
        type Context = ();

        async fn run(&self, _ctx: Self::Context) -> anyhow::Result<()> {
            Ok(())
        }
    }

    let (pool, _container) = test_utils::setup_test_db().await?;

    let runner = Runner::new(pool.clone(), ())
        .register_job_type::<TestJob>()
        .shutdown_when_queue_empty();

    assert_eq!(remaining_jobs(&pool).await?, 0);

    TestJob.enqueue(&pool).await?;
    assert_eq!(remaining_jobs(&pool).await?, 1);

    runner.start().wait_for_shutdown().await;
    assert_eq!(remaining_jobs(&pool).await?, 0);
    assert_eq!(archived_job_count(&pool).await?, 0);

    Ok(())
}

#[tokio::test]
async fn completed_jobs_are_archived_when_enabled() -> anyhow::Result<()> {
    #[derive(Serialize, Deserialize)]
    struct TestJob;

    impl BackgroundJob for TestJob {
        const JOB_NAME: &'static str = "test";
        type Context = ();

        async fn run(&self, _ctx: Self::Context) -> anyhow::Result<()> {
            Ok(())
        }
    }

    let (pool, _container) = test_utils::setup_test_db().await?;

    let runner = Runner::new(pool.clone(), ())
        .register_job_type::<TestJob>()
        .archive_completed_jobs(true)
        .shutdown_when_queue_empty();

    TestJob.enqueue(&pool).await?;
    runner.start().wait_for_shutdown().await;

    assert_eq!(remaining_jobs(&pool).await?, 0);
    assert_eq!(archived_job_count(&pool).await?, 1);

    let archived = get_archived_jobs(&pool, Some("test"), None).await?;
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].outcome, "completed");

    Ok(())
}

#[tokio::test]
async fn panicking_jobs_update_retry_counter() -> anyhow::Result<()> {
    #[derive(Serialize, Deserialize)]
    struct TestJob;

    impl BackgroundJob for TestJob {
        const JOB_NAME: &'static str = "test";
        type Context = ();

        async fn run(&self, _ctx: Self::Context) -> anyhow::Result<()> {
            panic!()
        }
    }

    let (pool, _container) = test_utils::setup_test_db().await?;

    let runner = Runner::new(pool.clone(), ())
        .register_job_type::<TestJob>()
        .shutdown_when_queue_empty();

    let job_id = assert_some!(TestJob.enqueue(&pool).await?);

    runner.start().wait_for_shutdown().await;

    let retries: i32 =
        sqlx::query_scalar("SELECT retries FROM background_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_one(&pool)
            .await?;
    assert_eq!(retries, 1);

    Ok(())
}

#[tokio::test]
async fn exhausted_retries_archive_the_job_as_failed() -> anyhow::Result<()> {
    #[derive(Serialize, Deserialize)]
    struct TestJob;

    impl BackgroundJob for TestJob {
        const JOB_NAME: &'static str = "test";
        type Context = ();

        async fn run(&self, _ctx: Self::Context) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("platform exploded"))
        }
    }

    let (pool, _container) = test_utils::setup_test_db().await?;

    let runner = Runner::new(pool.clone(), ())
        .register_job_type::<TestJob>()
        .max_retries(1)
        .shutdown_when_queue_empty();

    TestJob.enqueue(&pool).await?;
    runner.start().wait_for_shutdown().await;

    assert_eq!(remaining_jobs(&pool).await?, 0);

    let archived = get_archived_jobs(&pool, Some("test"), None).await?;
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].outcome, "failed");

    Ok(())
}

#[tokio::test]
async fn unknown_job_types_are_skipped_not_failed() -> anyhow::Result<()> {
    #[derive(Serialize, Deserialize)]
    struct TestJob;

    impl BackgroundJob for TestJob {
        const JOB_NAME: &'static str = "test";
        type Context = ();

        async fn run(&self, _ctx: Self::Context) -> anyhow::Result<()> {
            Ok(())
        }
    }

    let (pool, _container) = test_utils::setup_test_db().await?;

    // A job type nobody registered a handler for, e.g. from a newer deploy.
    sqlx::query("INSERT INTO background_jobs (job_type, data) VALUES ('launch_fireworks', '{}')")
        .execute(&pool)
        .await?;
    TestJob.enqueue(&pool).await?;

    let runner = Runner::new(pool.clone(), ())
        .register_job_type::<TestJob>()
        .shutdown_when_queue_empty();

    runner.start().wait_for_shutdown().await;

    // Both rows are gone: the known one ran, the unknown one was dropped
    // without being retried or archived as a failure.
    assert_eq!(remaining_jobs(&pool).await?, 0);
    assert_eq!(archived_job_count(&pool).await?, 0);

    Ok(())
}

#[tokio::test]
async fn jobs_can_be_deduplicated() -> anyhow::Result<()> {
    #[derive(Serialize, Deserialize)]
    struct TestJob {
        value: String,
    }

    impl BackgroundJob for TestJob {
        const JOB_NAME: &'static str = "test";
        const DEDUPLICATED: bool = true;
        type Context = ();

        async fn run(&self, _ctx: Self::Context) -> anyhow::Result<()> {
            Ok(())
        }
    }

    let new_job = |value: &str| TestJob {
        value: value.to_owned(),
    };

    let (pool, _container) = test_utils::setup_test_db().await?;

    // The first enqueue goes through, the identical second one is dropped.
    assert_some!(new_job("foo").enqueue(&pool).await?);
    assert_none!(new_job("foo").enqueue(&pool).await?);
    assert_compact_json_snapshot!(all_jobs(&pool).await?, @r#"[["test", {"value": "foo"}]]"#);

    // Different data is not deduplicated.
    assert_some!(new_job("bar").enqueue(&pool).await?);
    assert_compact_json_snapshot!(all_jobs(&pool).await?, @r#"[["test", {"value": "foo"}], ["test", {"value": "bar"}]]"#);

    Ok(())
}

#[tokio::test]
async fn sweeping_prunes_archived_jobs_beyond_the_retention_limits() -> anyhow::Result<()> {
    let (pool, _container) = test_utils::setup_test_db().await?;

    let scheduler = Scheduler::new(pool.clone());
    scheduler
        .register(&ScheduleDefinition {
            name: "test-hourly".to_owned(),
            job_type: "test".to_owned(),
            cron_pattern: "0 * * * *".to_owned(),
            payload: serde_json::json!({}),
            retention: RetentionPolicy {
                keep_completed: 2,
                keep_failed: 1,
            },
        })
        .await?;

    // Five completed and three failed records, id 5 / id 8 being the newest.
    for (id, outcome, age_minutes) in [
        (1_i64, "completed", 5_i32),
        (2, "completed", 4),
        (3, "completed", 3),
        (4, "completed", 2),
        (5, "completed", 1),
        (6, "failed", 3),
        (7, "failed", 2),
        (8, "failed", 1),
    ] {
        sqlx::query(
            r"
            INSERT INTO archived_jobs
                (id, job_type, data, retries, last_retry, created_at, priority, outcome, archived_at)
            VALUES ($1, 'test', '{}', 0, NOW(), NOW(), 0, $2, NOW() - INTERVAL '1 minute' * $3)
            ",
        )
        .bind(id)
        .bind(outcome)
        .bind(age_minutes)
        .execute(&pool)
        .await?;
    }

    Cleaner::new(pool.clone()).sweep().await?;

    // The newest two completed and the newest failed record survive.
    let remaining: Vec<(i64, String)> =
        sqlx::query_as("SELECT id, outcome FROM archived_jobs ORDER BY id")
            .fetch_all(&pool)
            .await?;
    assert_eq!(
        remaining,
        vec![
            (4, "completed".to_owned()),
            (5, "completed".to_owned()),
            (8, "failed".to_owned()),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn graceful_shutdown_waits_for_the_inflight_job() -> anyhow::Result<()> {
    #[derive(Clone)]
    struct TestContext {
        job_started_barrier: Arc<Barrier>,
        shutdown_requested_barrier: Arc<Barrier>,
    }

    #[derive(Serialize, Deserialize)]
    struct TestJob;

    impl BackgroundJob for TestJob {
        const JOB_NAME: &'static str = "test";
        type Context = TestContext;

        async fn run(&self, ctx: Self::Context) -> anyhow::Result<()> {
            ctx.job_started_barrier.wait().await;
            ctx.shutdown_requested_barrier.wait().await;
            Ok(())
        }
    }

    let (pool, _container) = test_utils::setup_test_db().await?;

    let context = TestContext {
        job_started_barrier: Arc::new(Barrier::new(2)),
        shutdown_requested_barrier: Arc::new(Barrier::new(2)),
    };

    let runner = Runner::new(pool.clone(), context.clone())
        .register_job_type::<TestJob>()
        .poll_interval(Duration::from_millis(50));

    TestJob.enqueue(&pool).await?;

    let handle = runner.start();
    context.job_started_barrier.wait().await;

    // Request shutdown while the job is in flight, then let it finish.
    handle.shutdown();
    handle.shutdown();
    context.shutdown_requested_barrier.wait().await;

    tokio::time::timeout(Duration::from_secs(30), handle.wait_for_shutdown())
        .await
        .expect("worker did not drain within 30s");

    // The in-flight job ran to completion instead of being dropped.
    assert_eq!(remaining_jobs(&pool).await?, 0);

    Ok(())
}
