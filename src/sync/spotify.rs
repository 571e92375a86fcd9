//! Audio streaming platform (Spotify) metric sync.

use crate::BackgroundJob;
use crate::sync::{Platform, SyncContext, TimeBucket, engine, path_after};
use chrono::Utc;
use serde::{Deserialize, Serialize};

const TRACK_ID_LEN: usize = 22;

/// Recurring Spotify track metric sync; the time bucket derives from the
/// clock since this schedule carries no payload.
// Braced, not a unit struct: the scheduled `{}` payload must deserialize.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SpotifySyncJob {}

impl BackgroundJob for SpotifySyncJob {
    const JOB_NAME: &'static str = "sync_spotify_metrics";
    const DEDUPLICATED: bool = true;
    type Context = SyncContext;

    async fn run(&self, ctx: Self::Context) -> anyhow::Result<()> {
        let bucket = TimeBucket::current(Utc::now());
        engine::run_platform_sync(&ctx, Platform::Spotify, bucket, extract_track_id).await?;
        Ok(())
    }
}

/// Extract the 22-character base62 track id from `spotify:track:` URIs,
/// `open.spotify.com/track/` and `/embed/track/` URLs, or a bare id.
pub fn extract_track_id(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    if let Some(rest) = url.strip_prefix("spotify:track:") {
        return take_track_id(rest);
    }

    if url.contains("spotify.com/") {
        // Covers both /track/<id> and /embed/track/<id>.
        if let Some(rest) = path_after(url, "/track/") {
            return take_track_id(rest);
        }
        return None;
    }

    is_bare_track_id(url).then(|| url.to_owned())
}

fn take_track_id(rest: &str) -> Option<String> {
    let id: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    (id.len() == TRACK_ID_LEN).then_some(id)
}

fn is_bare_track_id(candidate: &str) -> bool {
    candidate.len() == TRACK_ID_LEN && candidate.chars().all(|c| c.is_ascii_alphanumeric())
}
