//! Audio hosting platform (SoundCloud) metric sync.

use crate::BackgroundJob;
use crate::sync::{Platform, SyncContext, TimeBucket, engine, path_after, query_param};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Recurring SoundCloud track metric sync.
// Braced, not a unit struct: the scheduled `{}` payload must deserialize.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SoundcloudSyncJob {}

impl BackgroundJob for SoundcloudSyncJob {
    const JOB_NAME: &'static str = "sync_soundcloud_metrics";
    const DEDUPLICATED: bool = true;
    type Context = SyncContext;

    async fn run(&self, ctx: Self::Context) -> anyhow::Result<()> {
        let bucket = TimeBucket::current(Utc::now());
        engine::run_platform_sync(&ctx, Platform::SoundCloud, bucket, extract_track_id).await?;
        Ok(())
    }
}

/// Extract the numeric track id from API URLs
/// (`api.soundcloud.com/tracks/<id>`), player embeds carrying the API URL in
/// their `url=` parameter (possibly percent-encoded), or a bare numeric id.
///
/// Public permalinks (`soundcloud.com/<artist>/<title>`) carry no numeric id
/// and require a resolve call; those campaigns are skipped and logged until
/// an API URL is stored for them.
pub fn extract_track_id(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    if let Some(rest) = path_after(url, "api.soundcloud.com/tracks/") {
        return take_track_id(rest);
    }

    if url.contains("w.soundcloud.com/player") {
        let embedded = query_param(url, "url")?;
        let rest = path_after(embedded, "tracks%2F").or_else(|| path_after(embedded, "tracks/"))?;
        return take_track_id(rest);
    }

    is_bare_track_id(url).then(|| url.to_owned())
}

fn take_track_id(rest: &str) -> Option<String> {
    let id: String = rest.chars().take_while(char::is_ascii_digit).collect();
    (!id.is_empty()).then_some(id)
}

fn is_bare_track_id(candidate: &str) -> bool {
    !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_urls_are_matched() {
        assert_eq!(
            extract_track_id("https://api.soundcloud.com/tracks/293").as_deref(),
            Some("293")
        );
        assert_eq!(
            extract_track_id("https://api.soundcloud.com/tracks/1578123456?secret=x").as_deref(),
            Some("1578123456")
        );
    }

    #[test]
    fn player_embeds_are_matched() {
        let encoded = "https://w.soundcloud.com/player/?url=https%3A//api.soundcloud.com/tracks%2F1578123456&color=%23ff5500";
        assert_eq!(extract_track_id(encoded).as_deref(), Some("1578123456"));

        let plain = "https://w.soundcloud.com/player/?url=https://api.soundcloud.com/tracks/293";
        assert_eq!(extract_track_id(plain).as_deref(), Some("293"));
    }

    #[test]
    fn bare_numeric_ids_are_matched() {
        assert_eq!(extract_track_id("1578123456").as_deref(), Some("1578123456"));
    }

    #[test]
    fn permalinks_and_junk_yield_none() {
        assert_eq!(extract_track_id(""), None);
        assert_eq!(extract_track_id("https://soundcloud.com/artist/some-track"), None);
        assert_eq!(extract_track_id("https://w.soundcloud.com/player/?color=red"), None);
        assert_eq!(extract_track_id("track-123"), None);
    }
}
