//! Campaign and metric snapshot persistence.

use crate::sync::client::PlatformMetrics;
use crate::sync::{Platform, TimeBucket};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};

/// A campaign record eligible for metric synchronization.
#[derive(Debug, Clone, FromRow)]
pub struct Campaign {
    /// Primary key.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Platform label (see [`Platform::as_str`]).
    pub platform: String,
    /// Stored media URL the external id is derived from.
    pub media_url: Option<String>,
    /// Campaign status; only `active` and `pending` are synced.
    pub status: String,
    /// Whether this campaign opted into metric sync.
    pub sync_enabled: bool,
    /// Denormalized latest view count.
    pub current_views: i64,
    /// Denormalized latest like count.
    pub current_likes: i64,
    /// Denormalized latest comment count.
    pub current_comments: i64,
    /// When a handler last synced this campaign successfully.
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Campaigns eligible for sync on one platform, in stable id order.
///
/// Campaigns without the `sync_enabled` flag are never touched, regardless
/// of status.
pub(crate) async fn syncable_campaigns(
    pool: &PgPool,
    platform: Platform,
) -> Result<Vec<Campaign>, sqlx::Error> {
    sqlx::query_as::<_, Campaign>(
        r"
        SELECT id, name, platform, media_url, status, sync_enabled,
               current_views, current_likes, current_comments, last_synced_at
        FROM campaigns
        WHERE platform = $1
          AND sync_enabled = TRUE
          AND status IN ('active', 'pending')
        ORDER BY id ASC
        ",
    )
    .bind(platform.as_str())
    .fetch_all(pool)
    .await
}

/// Persist one metric reading: upsert the snapshot row and refresh the
/// campaign's denormalized current-state fields.
///
/// The snapshot is keyed by (campaign, date, time bucket) with an
/// upsert-on-conflict, never read-then-write, so overlapping runs converge
/// to last-write-wins on the same row instead of duplicating it.
pub(crate) async fn record_metrics(
    pool: &PgPool,
    campaign_id: i64,
    snapshot_date: NaiveDate,
    bucket: TimeBucket,
    metrics: PlatformMetrics,
    collected_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r"
        INSERT INTO metric_snapshots
            (campaign_id, snapshot_date, time_bucket, views, likes, comments, collected_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (campaign_id, snapshot_date, time_bucket) DO UPDATE SET
            views = EXCLUDED.views,
            likes = EXCLUDED.likes,
            comments = EXCLUDED.comments,
            collected_at = EXCLUDED.collected_at
        ",
    )
    .bind(campaign_id)
    .bind(snapshot_date)
    .bind(bucket.as_str())
    .bind(metrics.views)
    .bind(metrics.likes)
    .bind(metrics.comments)
    .bind(collected_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
        UPDATE campaigns
        SET current_views = $2, current_likes = $3, current_comments = $4, last_synced_at = $5
        WHERE id = $1
        ",
    )
    .bind(campaign_id)
    .bind(metrics.views)
    .bind(metrics.likes)
    .bind(metrics.comments)
    .bind(collected_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}
