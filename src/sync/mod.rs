//! Platform metric synchronization.
//!
//! One handler per external platform plus a maintenance handler. Every
//! handler follows the same shape: load the campaigns flagged for sync,
//! derive the platform-native media id from the stored URL, pull current
//! metrics, and persist an idempotent snapshot. Per-entity failures are
//! isolated; one bad record never aborts a batch.

pub mod client;
pub mod engine;
pub mod health;
pub mod instagram;
pub mod model;
pub mod soundcloud;
pub mod spotify;
pub mod youtube;

use crate::sync::client::MetricsFetcher;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;

/// External platform a campaign is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Video platform (YouTube).
    YouTube,
    /// Audio streaming platform (Spotify).
    Spotify,
    /// Audio hosting platform (SoundCloud).
    SoundCloud,
    /// Social platform (Instagram).
    Instagram,
}

impl Platform {
    /// The label stored in the `campaigns.platform` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::Spotify => "spotify",
            Platform::SoundCloud => "soundcloud",
            Platform::Instagram => "instagram",
        }
    }
}

/// Coarse label distinguishing multiple same-day metric collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBucket {
    /// Collections before 12:00 UTC.
    Morning,
    /// Collections between 12:00 and 18:00 UTC.
    Afternoon,
    /// Collections from 18:00 UTC on.
    Evening,
    /// Operator-triggered runs; kept separate so they never clobber a
    /// scheduled collection for the same day.
    Manual,
}

impl TimeBucket {
    /// The label stored in the `metric_snapshots.time_bucket` column.
    pub fn as_str(self) -> &'static str {
        match self {
            TimeBucket::Morning => "morning",
            TimeBucket::Afternoon => "afternoon",
            TimeBucket::Evening => "evening",
            TimeBucket::Manual => "manual",
        }
    }

    /// The bucket a collection at `now` falls into.
    pub fn current(now: DateTime<Utc>) -> Self {
        match now.hour() {
            0..=11 => TimeBucket::Morning,
            12..=17 => TimeBucket::Afternoon,
            _ => TimeBucket::Evening,
        }
    }
}

/// Per-job tally of how a sync batch went. Logged and returned, never
/// persisted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// Entities whose metrics were fetched and persisted.
    pub succeeded: usize,
    /// Entities that were skipped or errored.
    pub failed: usize,
    /// Total eligible entities in the batch.
    pub total: usize,
}

/// Shared context handed to every sync job by the worker.
#[derive(Clone)]
pub struct SyncContext {
    /// Shared datastore pool.
    pub pool: PgPool,
    /// Platform API client (swappable for tests).
    pub api: Arc<dyn MetricsFetcher>,
    /// Entities synced concurrently within one batch. 1 means strictly
    /// sequential calls, which is the default to respect external rate
    /// limits.
    pub concurrency: usize,
}

/// The value of a query-string parameter, if present.
pub(crate) fn query_param<'a>(url: &'a str, key: &str) -> Option<&'a str> {
    let query = url.split_once('?')?.1;
    let query = query.split('#').next().unwrap_or(query);
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then_some(v)
    })
}

/// The remainder of `url` after the first occurrence of `marker`.
pub(crate) fn path_after<'a>(url: &'a str, marker: &str) -> Option<&'a str> {
    let idx = url.find(marker)?;
    Some(&url[idx + marker.len()..])
}
