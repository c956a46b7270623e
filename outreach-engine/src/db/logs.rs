//! Campaign stage log persistence

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use outreach_common::models::CampaignLog;
use outreach_common::Result;

use super::{parse_ts, parse_uuid};

pub async fn insert_log(pool: &SqlitePool, log: &CampaignLog) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO campaign_logs (id, campaign_id, stage, level, message, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(log.id.to_string())
    .bind(log.campaign_id.to_string())
    .bind(&log.stage)
    .bind(&log.level)
    .bind(&log.message)
    .bind(log.created_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

/// Logs for a campaign, oldest first so the pipeline reads as a narrative
pub async fn list_logs(pool: &SqlitePool, campaign_id: Uuid, limit: i64) -> Result<Vec<CampaignLog>> {
    let rows = sqlx::query(
        r#"
        SELECT id, campaign_id, stage, level, message, created_at
        FROM campaign_logs WHERE campaign_id = ? ORDER BY created_at ASC LIMIT ?
        "#,
    )
    .bind(campaign_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(CampaignLog {
                id: parse_uuid(row.try_get("id")?)?,
                campaign_id: parse_uuid(row.try_get("campaign_id")?)?,
                stage: row.try_get("stage")?,
                level: row.try_get("level")?,
                message: row.try_get("message")?,
                created_at: parse_ts(row.try_get("created_at")?)?,
            })
        })
        .collect()
}
