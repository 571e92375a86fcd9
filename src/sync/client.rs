//! Thin HTTP clients for the external platform APIs.
//!
//! One request per entity; every call carries an explicit deadline instead
//! of relying on transport defaults. Credentials come from the environment,
//! and their absence is surfaced as a configuration error before any call
//! is attempted.

use crate::errors::ClientError;
use crate::sync::Platform;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Metric counters returned by a platform API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformMetrics {
    /// View / play count (platform equivalent).
    pub views: i64,
    /// Like / favorite count.
    pub likes: i64,
    /// Comment count.
    pub comments: i64,
}

/// Abstraction over the per-platform metric APIs, so handlers can be tested
/// against a scripted implementation.
pub trait MetricsFetcher: Send + Sync {
    /// Fetch current metrics for an external media id on the given platform.
    fn fetch<'a>(
        &'a self,
        platform: Platform,
        external_id: &'a str,
    ) -> BoxFuture<'a, Result<PlatformMetrics, ClientError>>;

    /// Whether credentials for a platform are configured at all. Checked
    /// once per batch so a missing key fails the batch up front.
    fn credentials_configured(&self, platform: Platform) -> bool;
}

/// Environment-provided API credentials.
#[derive(Debug, Clone, Default)]
pub struct PlatformApiConfig {
    /// `YOUTUBE_API_KEY`
    pub youtube_api_key: Option<String>,
    /// `SPOTIFY_API_TOKEN`
    pub spotify_api_token: Option<String>,
    /// `SOUNDCLOUD_CLIENT_ID`
    pub soundcloud_client_id: Option<String>,
    /// `INSTAGRAM_ACCESS_TOKEN`
    pub instagram_access_token: Option<String>,
}

impl PlatformApiConfig {
    /// Read all platform credentials from the environment. Missing keys are
    /// not an error here; the affected platform degrades at sync time.
    pub fn from_env() -> Self {
        fn non_empty(key: &str) -> Option<String> {
            env::var(key).ok().filter(|value| !value.is_empty())
        }

        Self {
            youtube_api_key: non_empty("YOUTUBE_API_KEY"),
            spotify_api_token: non_empty("SPOTIFY_API_TOKEN"),
            soundcloud_client_id: non_empty("SOUNDCLOUD_CLIENT_ID"),
            instagram_access_token: non_empty("INSTAGRAM_ACCESS_TOKEN"),
        }
    }
}

/// Production [`MetricsFetcher`] backed by the real platform APIs.
pub struct HttpPlatformClient {
    http: reqwest::Client,
    config: PlatformApiConfig,
}

impl HttpPlatformClient {
    /// Build the HTTP client with the per-call deadline applied.
    pub fn new(config: PlatformApiConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("campaign-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, config })
    }

    async fn youtube_metrics(&self, video_id: &str) -> Result<PlatformMetrics, ClientError> {
        let key = self
            .config
            .youtube_api_key
            .as_deref()
            .ok_or(ClientError::MissingCredentials("youtube"))?;

        let body: Value = self
            .http
            .get("https://www.googleapis.com/youtube/v3/videos")
            .query(&[("part", "statistics"), ("id", video_id), ("key", key)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let statistics = body
            .pointer("/items/0/statistics")
            .ok_or_else(|| ClientError::Api(format!("video {video_id} not found")))?;

        Ok(PlatformMetrics {
            views: as_count(&statistics["viewCount"]),
            likes: as_count(&statistics["likeCount"]),
            comments: as_count(&statistics["commentCount"]),
        })
    }

    async fn spotify_metrics(&self, track_id: &str) -> Result<PlatformMetrics, ClientError> {
        let token = self
            .config
            .spotify_api_token
            .as_deref()
            .ok_or(ClientError::MissingCredentials("spotify"))?;

        let body: Value = self
            .http
            .get(format!("https://api.spotify.com/v1/tracks/{track_id}"))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if body.get("id").is_none() {
            return Err(ClientError::Api(format!("track {track_id} not found")));
        }

        // The public API exposes no play counts; popularity (0-100) is the
        // closest view-equivalent signal available.
        Ok(PlatformMetrics {
            views: as_count(&body["popularity"]),
            likes: 0,
            comments: 0,
        })
    }

    async fn soundcloud_metrics(&self, track_id: &str) -> Result<PlatformMetrics, ClientError> {
        let client_id = self
            .config
            .soundcloud_client_id
            .as_deref()
            .ok_or(ClientError::MissingCredentials("soundcloud"))?;

        let body: Value = self
            .http
            .get(format!("https://api.soundcloud.com/tracks/{track_id}"))
            .query(&[("client_id", client_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(PlatformMetrics {
            views: as_count(&body["playback_count"]),
            likes: as_count(&body["likes_count"]),
            comments: as_count(&body["comment_count"]),
        })
    }

    async fn instagram_metrics(&self, media_id: &str) -> Result<PlatformMetrics, ClientError> {
        let token = self
            .config
            .instagram_access_token
            .as_deref()
            .ok_or(ClientError::MissingCredentials("instagram"))?;

        let body: Value = self
            .http
            .get(format!("https://graph.instagram.com/{media_id}"))
            .query(&[
                ("fields", "like_count,comments_count,video_view_count"),
                ("access_token", token),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = body.get("error") {
            return Err(ClientError::Api(error.to_string()));
        }

        Ok(PlatformMetrics {
            views: as_count(&body["video_view_count"]),
            likes: as_count(&body["like_count"]),
            comments: as_count(&body["comments_count"]),
        })
    }
}

impl MetricsFetcher for HttpPlatformClient {
    fn fetch<'a>(
        &'a self,
        platform: Platform,
        external_id: &'a str,
    ) -> BoxFuture<'a, Result<PlatformMetrics, ClientError>> {
        match platform {
            Platform::YouTube => self.youtube_metrics(external_id).boxed(),
            Platform::Spotify => self.spotify_metrics(external_id).boxed(),
            Platform::SoundCloud => self.soundcloud_metrics(external_id).boxed(),
            Platform::Instagram => self.instagram_metrics(external_id).boxed(),
        }
    }

    fn credentials_configured(&self, platform: Platform) -> bool {
        match platform {
            Platform::YouTube => self.config.youtube_api_key.is_some(),
            Platform::Spotify => self.config.spotify_api_token.is_some(),
            Platform::SoundCloud => self.config.soundcloud_client_id.is_some(),
            Platform::Instagram => self.config.instagram_access_token.is_some(),
        }
    }
}

// YouTube returns counters as JSON strings, the other platforms as numbers.
fn as_count(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_parse_from_strings_and_numbers() {
        assert_eq!(as_count(&json!("12345")), 12345);
        assert_eq!(as_count(&json!(678)), 678);
        assert_eq!(as_count(&json!(null)), 0);
        assert_eq!(as_count(&json!("not-a-number")), 0);
    }

    #[test]
    fn missing_keys_leave_credentials_unconfigured() {
        let client = HttpPlatformClient::new(PlatformApiConfig {
            youtube_api_key: Some("key".to_owned()),
            ..PlatformApiConfig::default()
        })
        .unwrap();

        assert!(client.credentials_configured(Platform::YouTube));
        assert!(!client.credentials_configured(Platform::Spotify));
        assert!(!client.credentials_configured(Platform::SoundCloud));
        assert!(!client.credentials_configured(Platform::Instagram));
    }
}
