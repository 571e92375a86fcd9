use crate::schema::{ArchivedJob, BackgroundJob, JobOutcome};
use sqlx::{PgPool, Postgres, Transaction};

/// Run the embedded migrations, creating the queue, schedule, campaign and
/// snapshot tables if they do not exist yet.
pub async fn setup_database(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// The number of jobs waiting in the queue
pub(crate) async fn pending_job_count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM background_jobs")
        .fetch_one(pool)
        .await
}

/// The number of jobs that have failed at least once
pub(crate) async fn failed_job_count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM background_jobs WHERE retries > 0")
        .fetch_one(pool)
        .await
}

/// Finds the next job that is unlocked, and ready to be retried.
///
/// No job-type filter is applied on purpose: rows with a type nobody
/// registered a handler for must still be fetched so the worker can log and
/// drop them instead of leaving them in the queue forever.
pub(crate) async fn find_next_unlocked_job_tx(
    tx: &mut Transaction<'_, Postgres>,
) -> Result<BackgroundJob, sqlx::Error> {
    sqlx::query_as::<_, BackgroundJob>(
        r"
        SELECT id, job_type, data, retries, last_retry, created_at, priority
        FROM background_jobs
        WHERE retries = 0 OR last_retry < NOW() - INTERVAL '1 minute' * POWER(2, retries)
        ORDER BY priority DESC, id ASC
        FOR UPDATE SKIP LOCKED
        LIMIT 1
        ",
    )
    .fetch_one(&mut **tx)
    .await
}

/// Deletes a job row. Used for completed jobs when archiving is off, and for
/// jobs whose type has no registered handler.
pub(crate) async fn delete_job(
    tx: &mut Transaction<'_, Postgres>,
    job_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM background_jobs WHERE id = $1")
        .bind(job_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Marks that we just tried and failed to run a job.
///
/// The retry counter is bumped inside the same transaction that holds the row
/// lock, so there is no window where the row is unlocked but still looks
/// fresh to another worker.
pub(crate) async fn update_failed_job(
    tx: &mut Transaction<'_, Postgres>,
    job_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE background_jobs SET retries = retries + 1, last_retry = NOW() WHERE id = $1",
    )
    .bind(job_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Moves a finished job from `background_jobs` to `archived_jobs`, recording
/// whether it completed or exhausted its retries.
pub(crate) async fn archive_finished_job(
    tx: &mut Transaction<'_, Postgres>,
    job_id: i64,
    outcome: JobOutcome,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        INSERT INTO archived_jobs (id, job_type, data, retries, last_retry, created_at, priority, outcome)
        SELECT id, job_type, data, retries, last_retry, created_at, priority, $2
        FROM background_jobs
        WHERE id = $1
        ",
    )
    .bind(job_id)
    .bind(outcome.as_str())
    .execute(&mut **tx)
    .await?;

    sqlx::query("DELETE FROM background_jobs WHERE id = $1")
        .bind(job_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Deletes archived rows of one (job type, outcome) pair beyond the retention
/// limit, newest kept. Returns the number of pruned rows.
pub(crate) async fn prune_archived_jobs(
    pool: &PgPool,
    job_type: &str,
    outcome: JobOutcome,
    keep: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r"
        DELETE FROM archived_jobs
        WHERE id IN (
            SELECT id FROM archived_jobs
            WHERE job_type = $1 AND outcome = $2
            ORDER BY archived_at DESC
            OFFSET $3
        )
        ",
    )
    .bind(job_type)
    .bind(outcome.as_str())
    .bind(keep.max(0))
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Get archived jobs, optionally filtered by job type and limited in count
pub async fn get_archived_jobs(
    pool: &PgPool,
    job_type: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<ArchivedJob>, sqlx::Error> {
    let mut query = "SELECT id, job_type, data, retries, last_retry, created_at, priority, outcome, archived_at FROM archived_jobs".to_string();

    if job_type.is_some() {
        query.push_str(" WHERE job_type = $1");
    }

    query.push_str(" ORDER BY archived_at DESC");

    if limit.is_some() {
        if job_type.is_some() {
            query.push_str(" LIMIT $2");
        } else {
            query.push_str(" LIMIT $1");
        }
    }

    let mut query_builder = sqlx::query_as::<_, ArchivedJob>(&query);

    if let Some(job_type_val) = job_type {
        query_builder = query_builder.bind(job_type_val);
    }

    if let Some(limit_val) = limit {
        query_builder = query_builder.bind(limit_val);
    }

    query_builder.fetch_all(pool).await
}

/// Get count of archived jobs
pub async fn archived_job_count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM archived_jobs")
        .fetch_one(pool)
        .await
}
