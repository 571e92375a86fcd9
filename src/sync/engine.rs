//! The shared per-entity sync loop.
//!
//! All platform handlers funnel through [`run_platform_sync`]; the platform
//! modules only contribute the id-extraction rules and the job definitions.

use crate::sync::model::{self, Campaign};
use crate::sync::{Platform, SyncContext, SyncOutcome, TimeBucket};
use anyhow::anyhow;
use chrono::Utc;
use futures_util::StreamExt;
use futures_util::stream;
use tracing::{info, warn};

/// Sync every eligible campaign on one platform.
///
/// Failures are isolated per entity: a network error, an unparseable media
/// URL or a datastore error for one campaign is logged with its id, counted
/// in the outcome, and never affects the siblings. The batch itself only
/// errors when the eligibility query fails.
pub async fn run_platform_sync(
    ctx: &SyncContext,
    platform: Platform,
    bucket: TimeBucket,
    extract_id: fn(&str) -> Option<String>,
) -> anyhow::Result<SyncOutcome> {
    let campaigns = model::syncable_campaigns(&ctx.pool, platform).await?;
    let total = campaigns.len();

    if campaigns.is_empty() {
        info!(platform = platform.as_str(), "Nothing to sync");
        return Ok(SyncOutcome::default());
    }

    // A missing API key is a configuration error, not a transient one:
    // mark the whole batch failed instead of attempting futile calls.
    if !ctx.api.credentials_configured(platform) {
        warn!(
            platform = platform.as_str(),
            total, "Missing credentials; marking the whole batch as failed"
        );
        return Ok(SyncOutcome {
            succeeded: 0,
            failed: total,
            total,
        });
    }

    let mut outcome = SyncOutcome {
        total,
        ..SyncOutcome::default()
    };

    // Sequential by default to avoid bursts against rate-limited APIs; a
    // bounded pool is opt-in via the concurrency setting.
    if ctx.concurrency <= 1 {
        for campaign in &campaigns {
            match sync_one(ctx, campaign, platform, bucket, extract_id).await {
                Ok(()) => outcome.succeeded += 1,
                Err(error) => {
                    warn!(
                        platform = platform.as_str(),
                        campaign.id = campaign.id,
                        %error,
                        "Campaign sync failed"
                    );
                    outcome.failed += 1;
                }
            }
        }
    } else {
        // Each queued future owns its campaign row.
        let results: Vec<(i64, anyhow::Result<()>)> = stream::iter(campaigns)
            .map(|campaign| async move {
                let result = sync_one(ctx, &campaign, platform, bucket, extract_id).await;
                (campaign.id, result)
            })
            .buffer_unordered(ctx.concurrency)
            .collect()
            .await;

        for (campaign_id, result) in results {
            match result {
                Ok(()) => outcome.succeeded += 1,
                Err(error) => {
                    warn!(
                        platform = platform.as_str(),
                        campaign.id = campaign_id,
                        %error,
                        "Campaign sync failed"
                    );
                    outcome.failed += 1;
                }
            }
        }
    }

    info!(
        platform = platform.as_str(),
        bucket = bucket.as_str(),
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        total = outcome.total,
        "Platform sync finished"
    );

    Ok(outcome)
}

async fn sync_one(
    ctx: &SyncContext,
    campaign: &Campaign,
    platform: Platform,
    bucket: TimeBucket,
    extract_id: fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    let media_url = campaign.media_url.as_deref().unwrap_or_default();
    let external_id = extract_id(media_url)
        .ok_or_else(|| anyhow!("no recognizable media id in {media_url:?}"))?;

    let metrics = ctx.api.fetch(platform, &external_id).await?;

    let now = Utc::now();
    model::record_metrics(&ctx.pool, campaign.id, now.date_naive(), bucket, metrics, now).await?;

    Ok(())
}
