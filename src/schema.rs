//! Database row types for the job queue tables.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;

/// Represents a background job record in the database
#[derive(Debug, Clone, FromRow)]
pub struct BackgroundJob {
    /// Unique identifier for the job
    pub id: i64,
    /// Type identifier for the job (used for dispatch)
    pub job_type: String,
    /// JSON data containing the job payload
    pub data: Value,
    /// Number of retry attempts made
    pub retries: i32,
    /// Timestamp of the last retry attempt
    pub last_retry: DateTime<Utc>,
    /// Timestamp when the job was created
    pub created_at: DateTime<Utc>,
    /// Priority of the job (higher = more important)
    pub priority: i16,
}

/// Final outcome recorded when a finished job is moved to the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The handler returned successfully.
    Completed,
    /// The handler failed and the retry budget is exhausted.
    Failed,
}

impl JobOutcome {
    /// The label stored in the `outcome` column.
    pub fn as_str(self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Failed => "failed",
        }
    }
}

/// Represents an archived job record in the database
#[derive(Debug, Clone, FromRow)]
pub struct ArchivedJob {
    /// The original background job data
    #[sqlx(flatten)]
    pub job: BackgroundJob,
    /// Whether the job completed or failed (see [`JobOutcome`])
    pub outcome: String,
    /// Timestamp when the job was archived
    pub archived_at: DateTime<Utc>,
}
