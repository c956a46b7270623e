//! Engagement history and conversion event persistence

use std::collections::HashMap;

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use outreach_common::models::{
    Channel, ConversionEvent, ConversionKind, EngagementHistory, EngagementType,
};
use outreach_common::Result;

use super::{parse_opt_json, parse_opt_uuid, parse_ts, parse_uuid};

pub async fn insert_engagement(pool: &SqlitePool, event: &EngagementHistory) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO engagement_history (
            id, campaign_id, contact_id, channel, engagement_type, payload, occurred_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.id.to_string())
    .bind(event.campaign_id.to_string())
    .bind(event.contact_id.map(|id| id.to_string()))
    .bind(event.channel.as_str())
    .bind(event.engagement_type.as_str())
    .bind(
        event
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    )
    .bind(event.occurred_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_conversion(pool: &SqlitePool, event: &ConversionEvent) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO conversion_events (id, campaign_id, contact_id, kind, occurred_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.id.to_string())
    .bind(event.campaign_id.to_string())
    .bind(event.contact_id.map(|id| id.to_string()))
    .bind(event.kind.as_str())
    .bind(event.occurred_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

/// Engagement rows for a campaign, newest first
pub async fn list_engagement(
    pool: &SqlitePool,
    campaign_id: Uuid,
    limit: i64,
) -> Result<Vec<EngagementHistory>> {
    let rows = sqlx::query(
        r#"
        SELECT id, campaign_id, contact_id, channel, engagement_type, payload, occurred_at
        FROM engagement_history WHERE campaign_id = ? ORDER BY occurred_at DESC LIMIT ?
        "#,
    )
    .bind(campaign_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(engagement_from_row).collect()
}

/// Per-channel engagement event counts for one contact, used by channel
/// decision scoring.
pub async fn channel_event_counts(
    pool: &SqlitePool,
    contact_id: Uuid,
) -> Result<HashMap<(Channel, EngagementType), i64>> {
    let rows = sqlx::query(
        r#"
        SELECT channel, engagement_type, COUNT(*) AS n
        FROM engagement_history WHERE contact_id = ?
        GROUP BY channel, engagement_type
        "#,
    )
    .bind(contact_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut counts = HashMap::new();
    for row in rows {
        let channel = Channel::parse(row.try_get("channel")?)?;
        let engagement = EngagementType::parse(row.try_get("engagement_type")?)?;
        counts.insert((channel, engagement), row.try_get::<i64, _>("n")?);
    }
    Ok(counts)
}

pub(crate) fn engagement_from_row(row: sqlx::sqlite::SqliteRow) -> Result<EngagementHistory> {
    let contact_id: Option<String> = row.try_get("contact_id")?;
    let payload: Option<String> = row.try_get("payload")?;
    Ok(EngagementHistory {
        id: parse_uuid(row.try_get("id")?)?,
        campaign_id: parse_uuid(row.try_get("campaign_id")?)?,
        contact_id: parse_opt_uuid(contact_id.as_deref())?,
        channel: Channel::parse(row.try_get("channel")?)?,
        engagement_type: EngagementType::parse(row.try_get("engagement_type")?)?,
        payload: parse_opt_json(payload.as_deref())?,
        occurred_at: parse_ts(row.try_get("occurred_at")?)?,
    })
}

/// Conversion rows for a campaign
pub async fn list_conversions(
    pool: &SqlitePool,
    campaign_id: Uuid,
) -> Result<Vec<ConversionEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT id, campaign_id, contact_id, kind, occurred_at
        FROM conversion_events WHERE campaign_id = ? ORDER BY occurred_at DESC
        "#,
    )
    .bind(campaign_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let contact_id: Option<String> = row.try_get("contact_id")?;
            Ok(ConversionEvent {
                id: parse_uuid(row.try_get("id")?)?,
                campaign_id: parse_uuid(row.try_get("campaign_id")?)?,
                contact_id: parse_opt_uuid(contact_id.as_deref())?,
                kind: ConversionKind::parse(row.try_get("kind")?)?,
                occurred_at: parse_ts(row.try_get("occurred_at")?)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{campaigns, contacts};
    use outreach_common::db::init_memory_database;
    use outreach_common::models::{Campaign, Contact};

    #[tokio::test]
    async fn engagement_round_trip_with_payload() {
        let pool = init_memory_database().await.unwrap();
        let campaign = Campaign::from_prompt("test", None, true);
        campaigns::insert_campaign(&pool, &campaign).await.unwrap();
        let contact = Contact::new("Asha", "asha@example.com");
        contacts::insert_contact(&pool, &contact).await.unwrap();

        let event = EngagementHistory::new(
            campaign.id,
            Some(contact.id),
            Channel::Call,
            EngagementType::Answered,
        )
        .with_payload(serde_json::json!({"duration_seconds": 42}));
        insert_engagement(&pool, &event).await.unwrap();

        let listed = list_engagement(&pool, campaign.id, 100).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].engagement_type, EngagementType::Answered);
        assert_eq!(listed[0].payload.as_ref().unwrap()["duration_seconds"], 42);

        let counts = channel_event_counts(&pool, contact.id).await.unwrap();
        assert_eq!(counts[&(Channel::Call, EngagementType::Answered)], 1);
    }
}
