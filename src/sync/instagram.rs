//! Social platform (Instagram) metric sync.

use crate::BackgroundJob;
use crate::sync::{Platform, SyncContext, TimeBucket, engine, path_after};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Recurring Instagram media metric sync.
// Braced, not a unit struct: the scheduled `{}` payload must deserialize.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InstagramSyncJob {}

impl BackgroundJob for InstagramSyncJob {
    const JOB_NAME: &'static str = "sync_instagram_metrics";
    const DEDUPLICATED: bool = true;
    type Context = SyncContext;

    async fn run(&self, ctx: Self::Context) -> anyhow::Result<()> {
        let bucket = TimeBucket::current(Utc::now());
        engine::run_platform_sync(&ctx, Platform::Instagram, bucket, extract_media_code).await?;
        Ok(())
    }
}

/// Extract the media shortcode from post, reel and IGTV URLs, or accept a
/// bare shortcode.
pub fn extract_media_code(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    if url.contains("instagram.com/") {
        for marker in ["/p/", "/reel/", "/tv/"] {
            if let Some(rest) = path_after(url, marker) {
                return take_media_code(rest);
            }
        }
        return None;
    }

    take_bare_media_code(url)
}

// Shortcodes are base64url-ish; real ones are at least 5 characters.
fn take_media_code(rest: &str) -> Option<String> {
    let code: String = rest.chars().take_while(|c| is_code_char(*c)).collect();
    (code.len() >= 5).then_some(code)
}

fn take_bare_media_code(candidate: &str) -> Option<String> {
    (candidate.len() >= 5 && candidate.len() <= 32 && candidate.chars().all(is_code_char))
        .then(|| candidate.to_owned())
}

fn is_code_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_reel_and_tv_urls_are_matched() {
        assert_eq!(
            extract_media_code("https://www.instagram.com/p/CxYzAb1tUvW/").as_deref(),
            Some("CxYzAb1tUvW")
        );
        assert_eq!(
            extract_media_code("https://instagram.com/reel/CxYzAb1tUvW/?igsh=1").as_deref(),
            Some("CxYzAb1tUvW")
        );
        assert_eq!(
            extract_media_code("https://www.instagram.com/tv/CxYzAb1tUvW").as_deref(),
            Some("CxYzAb1tUvW")
        );
    }

    #[test]
    fn bare_shortcodes_are_matched() {
        assert_eq!(
            extract_media_code("CxYzAb1tUvW").as_deref(),
            Some("CxYzAb1tUvW")
        );
    }

    #[test]
    fn profiles_and_junk_yield_none() {
        assert_eq!(extract_media_code(""), None);
        assert_eq!(extract_media_code("https://www.instagram.com/someuser/"), None);
        assert_eq!(extract_media_code("https://example.com/p/CxYzAb1tUvW/"), None);
        assert_eq!(extract_media_code("ab"), None);
    }
}
