//! Worker configuration read from the environment at startup.

use std::env;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_RETRIES: i32 = 5;

/// Explicit startup configuration for the sync worker.
///
/// Constructed once and passed in; there is no module-level singleton. When
/// `database_url` is `None` the whole scheduling subsystem degrades to a
/// no-op instead of crashing the process, since none of the platform syncs
/// are safety-critical.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue backend connection string; `None` disables all scheduling.
    pub database_url: Option<String>,
    /// Entities synced concurrently within one batch (1 = sequential).
    pub sync_concurrency: usize,
    /// How often the worker polls for new jobs.
    pub poll_interval: Duration,
    /// Attempts a job gets before it is archived as failed.
    pub max_retries: i32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            sync_concurrency: 1,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl WorkerConfig {
    /// Read the configuration from the environment.
    ///
    /// `SYNC_WORKER_DISABLED` (any truthy value) or a missing/empty
    /// `DATABASE_URL` leaves the worker in degraded mode.
    pub fn from_env() -> Self {
        let disabled = env::var("SYNC_WORKER_DISABLED")
            .map(|value| is_truthy(&value))
            .unwrap_or(false);

        let database_url = if disabled {
            None
        } else {
            env::var("DATABASE_URL").ok().filter(|url| !url.is_empty())
        };

        let sync_concurrency = env::var("SYNC_CONCURRENCY")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(1)
            .clamp(1, 8);

        Self {
            database_url,
            sync_concurrency,
            ..Self::default()
        }
    }

    /// Whether the queue backend is configured at all.
    pub fn scheduling_enabled(&self) -> bool {
        self.database_url.is_some()
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_accepts_common_spellings() {
        for value in ["1", "true", "TRUE", "yes", "on", " on "] {
            assert!(is_truthy(value), "{value:?} should be truthy");
        }
        for value in ["0", "false", "no", "off", "", "nope"] {
            assert!(!is_truthy(value), "{value:?} should be falsy");
        }
    }

    #[test]
    fn default_config_is_degraded_and_sequential() {
        let config = WorkerConfig::default();
        assert!(!config.scheduling_enabled());
        assert_eq!(config.sync_concurrency, 1);
    }
}
