#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod background_job;
mod cleaner;
/// Worker configuration.
pub mod config;
mod errors;
mod job_registry;
mod runner;
/// Recurring schedule registration and triggering.
pub mod schedule;
/// Database schema definitions.
pub mod schema;
mod storage;
/// Platform metric synchronization handlers.
pub mod sync;
mod util;
mod worker;

/// The main trait for defining background jobs.
pub use self::background_job::BackgroundJob;
/// Retention pruning for archived job records.
pub use self::cleaner::Cleaner;
/// Startup configuration object.
pub use self::config::WorkerConfig;
/// Error type for job enqueueing operations.
pub use self::errors::{ClientError, EnqueueError};
/// The main runner that orchestrates job processing.
pub use self::runner::{RunHandle, Runner, ShutdownHandle};
/// Archived-job inspection and database setup helpers.
pub use self::storage::{archived_job_count, get_archived_jobs, setup_database};
