use thiserror::Error;

/// Errors that can occur while enqueueing a background job.
#[derive(Debug, Error)]
pub enum EnqueueError {
    /// The job payload could not be serialized to JSON.
    #[error(transparent)]
    SerializationError(#[from] serde_json::Error),

    /// The queue backend rejected the insert.
    #[error(transparent)]
    DatabaseError(#[from] sqlx::Error),
}

/// Errors reported by a platform API client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No credentials are configured for this platform. This is a
    /// configuration error, not a transient one: the whole batch is marked
    /// failed instead of attempting futile calls.
    #[error("missing credentials for {0}")]
    MissingCredentials(&'static str),

    /// Transport-level failure (timeout, DNS, connection reset, non-2xx).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform answered but the response did not contain usable metrics.
    #[error("platform error: {0}")]
    Api(String),
}
