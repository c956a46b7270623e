//! Aggregate queries backing the analytics and insights endpoints

use std::collections::HashMap;

use chrono::{Duration, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use outreach_common::models::{Channel, EngagementType};
use outreach_common::Result;

use super::parse_uuid;

/// Per-channel funnel counts for one campaign
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ChannelStats {
    pub sent: i64,
    pub delivered: i64,
    pub opened: i64,
    pub clicked: i64,
    pub answered: i64,
    pub bounced: i64,
}

/// Distinct contacts with a SENT outbound message, per channel
pub async fn sent_counts(
    pool: &SqlitePool,
    campaign_id: Uuid,
) -> Result<HashMap<Channel, i64>> {
    let rows = sqlx::query(
        r#"
        SELECT channel, COUNT(DISTINCT contact_id) AS n
        FROM outbound_messages
        WHERE campaign_id = ? AND status = 'SENT'
        GROUP BY channel
        "#,
    )
    .bind(campaign_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut counts = HashMap::new();
    for row in rows {
        counts.insert(
            Channel::parse(row.try_get("channel")?)?,
            row.try_get::<i64, _>("n")?,
        );
    }
    Ok(counts)
}

/// Engagement funnel per channel, counting distinct contacts per event type
/// (falling back to the row id when the contact is unknown)
pub async fn channel_stats(
    pool: &SqlitePool,
    campaign_id: Uuid,
) -> Result<HashMap<Channel, ChannelStats>> {
    let mut stats: HashMap<Channel, ChannelStats> = HashMap::new();

    for (channel, sent) in sent_counts(pool, campaign_id).await? {
        stats.entry(channel).or_default().sent = sent;
    }

    let rows = sqlx::query(
        r#"
        SELECT channel, engagement_type, COUNT(DISTINCT COALESCE(contact_id, id)) AS n
        FROM engagement_history
        WHERE campaign_id = ?
        GROUP BY channel, engagement_type
        "#,
    )
    .bind(campaign_id.to_string())
    .fetch_all(pool)
    .await?;

    for row in rows {
        let channel = Channel::parse(row.try_get("channel")?)?;
        let engagement = EngagementType::parse(row.try_get("engagement_type")?)?;
        let n: i64 = row.try_get("n")?;
        let entry = stats.entry(channel).or_default();
        match engagement {
            EngagementType::Delivered => entry.delivered = n,
            EngagementType::Open => entry.opened = n,
            EngagementType::Click => entry.clicked = n,
            EngagementType::Answered => entry.answered = n,
            EngagementType::Bounce => entry.bounced = n,
            _ => {}
        }
    }

    Ok(stats)
}

/// Average call length over answered calls, from the engagement payload
pub async fn avg_call_duration(pool: &SqlitePool, campaign_id: Uuid) -> Result<Option<f64>> {
    let avg: Option<f64> = sqlx::query_scalar(
        r#"
        SELECT AVG(CAST(json_extract(payload, '$.duration_seconds') AS REAL))
        FROM engagement_history
        WHERE campaign_id = ? AND engagement_type = 'ANSWERED'
          AND json_extract(payload, '$.duration_seconds') IS NOT NULL
        "#,
    )
    .bind(campaign_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(avg)
}

/// Engagement events bucketed by hour (UTC)
pub async fn hourly_engagement(
    pool: &SqlitePool,
    campaign_id: Uuid,
) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query(
        r#"
        SELECT strftime('%Y-%m-%dT%H:00:00Z', occurred_at) AS hour, COUNT(*) AS n
        FROM engagement_history
        WHERE campaign_id = ?
        GROUP BY hour ORDER BY hour
        "#,
    )
    .bind(campaign_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| Ok((row.try_get("hour")?, row.try_get("n")?)))
        .collect()
}

/// The five most-engaged contacts of a campaign
pub async fn top_contacts(
    pool: &SqlitePool,
    campaign_id: Uuid,
) -> Result<Vec<(Uuid, String, String, i64)>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id, c.name, c.email, COUNT(*) AS n
        FROM engagement_history e
        JOIN contacts c ON c.id = e.contact_id
        WHERE e.campaign_id = ? AND e.contact_id IS NOT NULL
        GROUP BY c.id, c.name, c.email
        ORDER BY n DESC LIMIT 5
        "#,
    )
    .bind(campaign_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok((
                parse_uuid(row.try_get("id")?)?,
                row.try_get("name")?,
                row.try_get("email")?,
                row.try_get("n")?,
            ))
        })
        .collect()
}

/// Total contacts targeted by the campaign (distinct recipients of any
/// outbound message)
pub async fn targeted_contacts(pool: &SqlitePool, campaign_id: Uuid) -> Result<i64> {
    let n: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT contact_id) FROM outbound_messages WHERE campaign_id = ?",
    )
    .bind(campaign_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(n)
}

pub async fn conversion_count(pool: &SqlitePool, campaign_id: Uuid) -> Result<i64> {
    let n: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM conversion_events WHERE campaign_id = ?")
            .bind(campaign_id.to_string())
            .fetch_one(pool)
            .await?;
    Ok(n)
}

// --- global insights ---

/// Campaign counts per pipeline state
pub async fn pipeline_state_counts(pool: &SqlitePool) -> Result<HashMap<String, i64>> {
    let rows =
        sqlx::query("SELECT pipeline_state, COUNT(*) AS n FROM campaigns GROUP BY pipeline_state")
            .fetch_all(pool)
            .await?;
    let mut counts = HashMap::new();
    for row in rows {
        counts.insert(
            row.try_get::<String, _>("pipeline_state")?,
            row.try_get::<i64, _>("n")?,
        );
    }
    Ok(counts)
}

/// Global engagement totals per event type
pub async fn engagement_totals(pool: &SqlitePool) -> Result<HashMap<String, i64>> {
    let rows = sqlx::query(
        "SELECT engagement_type, COUNT(*) AS n FROM engagement_history GROUP BY engagement_type",
    )
    .fetch_all(pool)
    .await?;
    let mut counts = HashMap::new();
    for row in rows {
        counts.insert(
            row.try_get::<String, _>("engagement_type")?,
            row.try_get::<i64, _>("n")?,
        );
    }
    Ok(counts)
}

/// Global outbound message counts per channel
pub async fn channel_totals(pool: &SqlitePool) -> Result<HashMap<String, i64>> {
    let rows =
        sqlx::query("SELECT channel, COUNT(*) AS n FROM outbound_messages GROUP BY channel")
            .fetch_all(pool)
            .await?;
    let mut counts = HashMap::new();
    for row in rows {
        counts.insert(
            row.try_get::<String, _>("channel")?,
            row.try_get::<i64, _>("n")?,
        );
    }
    Ok(counts)
}

/// Engagement events recorded in the last 24 hours
pub async fn recent_event_count(pool: &SqlitePool) -> Result<i64> {
    let since = (Utc::now() - Duration::hours(24)).to_rfc3339();
    let n: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM engagement_history WHERE occurred_at >= ?")
            .bind(since)
            .fetch_one(pool)
            .await?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{campaigns, contacts, engagement, messages};
    use outreach_common::db::init_memory_database;
    use outreach_common::models::{
        Campaign, Contact, EngagementHistory, OutboundMessage,
    };

    #[tokio::test]
    async fn channel_stats_aggregate_funnel() {
        let pool = init_memory_database().await.unwrap();
        let campaign = Campaign::from_prompt("test", None, true);
        campaigns::insert_campaign(&pool, &campaign).await.unwrap();
        let contact = Contact::new("Asha", "asha@example.com");
        contacts::insert_contact(&pool, &contact).await.unwrap();

        let mut msg = OutboundMessage::new(campaign.id, contact.id, Channel::Email);
        msg.mark_sent(Some("m1".to_string()));
        messages::insert_message(&pool, &msg).await.unwrap();

        for engagement_type in [
            EngagementType::Sent,
            EngagementType::Delivered,
            EngagementType::Open,
            EngagementType::Open,
        ] {
            engagement::insert_engagement(
                &pool,
                &EngagementHistory::new(
                    campaign.id,
                    Some(contact.id),
                    Channel::Email,
                    engagement_type,
                ),
            )
            .await
            .unwrap();
        }

        let stats = channel_stats(&pool, campaign.id).await.unwrap();
        let email = &stats[&Channel::Email];
        assert_eq!(email.sent, 1);
        assert_eq!(email.delivered, 1);
        // Two opens by the same contact count once
        assert_eq!(email.opened, 1);

        assert_eq!(targeted_contacts(&pool, campaign.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn answered_calls_average_duration() {
        let pool = init_memory_database().await.unwrap();
        let campaign = Campaign::from_prompt("test", None, true);
        campaigns::insert_campaign(&pool, &campaign).await.unwrap();

        for duration in [30, 60] {
            engagement::insert_engagement(
                &pool,
                &EngagementHistory::new(campaign.id, None, Channel::Call, EngagementType::Answered)
                    .with_payload(serde_json::json!({"duration_seconds": duration})),
            )
            .await
            .unwrap();
        }

        let avg = avg_call_duration(&pool, campaign.id).await.unwrap();
        assert_eq!(avg, Some(45.0));
    }

    #[tokio::test]
    async fn global_insight_counts() {
        let pool = init_memory_database().await.unwrap();
        let campaign = Campaign::from_prompt("test", None, true);
        campaigns::insert_campaign(&pool, &campaign).await.unwrap();

        let states = pipeline_state_counts(&pool).await.unwrap();
        assert_eq!(states["CREATED"], 1);
        assert_eq!(recent_event_count(&pool).await.unwrap(), 0);
    }
}
