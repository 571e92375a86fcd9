//! Video platform (YouTube) metric sync.

use crate::BackgroundJob;
use crate::sync::{Platform, SyncContext, TimeBucket, engine, path_after, query_param};
use chrono::Utc;
use serde::{Deserialize, Serialize};

const VIDEO_ID_LEN: usize = 11;

/// Recurring video metric sync. Scheduled three times a day with an explicit
/// time-of-day label; ad-hoc triggers omit the label or pass `manual`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VideoSyncJob {
    /// Which same-day bucket this collection belongs to. Falls back to the
    /// current clock when absent. External triggers send `timeOfDay`.
    #[serde(default, alias = "timeOfDay")]
    pub time_of_day: Option<TimeBucket>,
}

impl BackgroundJob for VideoSyncJob {
    const JOB_NAME: &'static str = "sync_youtube_metrics";
    const DEDUPLICATED: bool = true;
    type Context = SyncContext;

    async fn run(&self, ctx: Self::Context) -> anyhow::Result<()> {
        let bucket = self
            .time_of_day
            .unwrap_or_else(|| TimeBucket::current(Utc::now()));
        engine::run_platform_sync(&ctx, Platform::YouTube, bucket, extract_video_id).await?;
        Ok(())
    }
}

/// Extract the 11-character video id from any of the stored URL shapes, in
/// order: `youtu.be/<id>` short links, canonical `watch?v=<id>`, embed and
/// shorts paths, and bare ids. Unrecognized shapes yield `None` and the
/// campaign is skipped, not failed fatally.
pub fn extract_video_id(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    if let Some(rest) = path_after(url, "youtu.be/") {
        return take_video_id(rest);
    }

    if url.contains("youtube.com/") {
        if let Some(id) = query_param(url, "v") {
            return take_video_id(id);
        }
        for marker in ["/embed/", "/shorts/"] {
            if let Some(rest) = path_after(url, marker) {
                return take_video_id(rest);
            }
        }
        return None;
    }

    is_bare_video_id(url).then(|| url.to_owned())
}

// Ids are exactly 11 characters of [A-Za-z0-9_-].
fn take_video_id(rest: &str) -> Option<String> {
    let id: String = rest.chars().take_while(|c| is_id_char(*c)).collect();
    (id.len() == VIDEO_ID_LEN).then_some(id)
}

fn is_bare_video_id(candidate: &str) -> bool {
    candidate.len() == VIDEO_ID_LEN && candidate.chars().all(is_id_char)
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_links_are_matched() {
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ?t=43").as_deref(),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn canonical_urls_are_matched() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        // The id does not have to be the first query parameter.
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?t=10&v=dQw4w9WgXcQ&list=PL9").as_deref(),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn embed_and_shorts_paths_are_matched() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_video_id("https://youtube.com/shorts/dQw4w9WgXcQ?feature=share").as_deref(),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn bare_ids_are_matched() {
        assert_eq!(
            extract_video_id("dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(extract_video_id(" dQw4w9WgXcQ ").as_deref(), Some("dQw4w9WgXcQ"));
    }

    #[test]
    fn unrecognized_shapes_yield_none() {
        assert_eq!(extract_video_id(""), None);
        assert_eq!(extract_video_id("not-a-real-url"), None);
        assert_eq!(extract_video_id("https://example.com/watch?v=dQw4w9WgXcQ"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/watch?list=PL9"), None);
        assert_eq!(extract_video_id("https://youtu.be/too-short"), None);
        assert_eq!(extract_video_id("https://vimeo.com/12345678"), None);
    }

    #[test]
    fn payload_deserializes_with_and_without_label() {
        let job: VideoSyncJob = serde_json::from_str(r#"{"time_of_day":"morning"}"#).unwrap();
        assert_eq!(job.time_of_day, Some(TimeBucket::Morning));

        // External one-off triggers use the camelCase field name.
        let job: VideoSyncJob = serde_json::from_str(r#"{"timeOfDay":"evening"}"#).unwrap();
        assert_eq!(job.time_of_day, Some(TimeBucket::Evening));

        let job: VideoSyncJob = serde_json::from_str("{}").unwrap();
        assert_eq!(job.time_of_day, None);
    }
}
