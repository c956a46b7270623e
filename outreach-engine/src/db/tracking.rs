//! Raw email tracking event persistence

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use outreach_common::models::EmailTrackingEvent;
use outreach_common::Result;

use super::{parse_opt_json, parse_opt_uuid, parse_ts, parse_uuid};

pub async fn insert_tracking_event(pool: &SqlitePool, event: &EmailTrackingEvent) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO email_tracking_events (
            id, campaign_id, email, event_type, provider_message_id, payload, occurred_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.id.to_string())
    .bind(event.campaign_id.map(|id| id.to_string()))
    .bind(&event.email)
    .bind(&event.event_type)
    .bind(&event.provider_message_id)
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

/// Tracking events attributed to a campaign, newest first
pub async fn list_tracking_events(
    pool: &SqlitePool,
    campaign_id: Uuid,
    limit: i64,
) -> Result<Vec<EmailTrackingEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT id, campaign_id, email, event_type, provider_message_id, payload, occurred_at
        FROM email_tracking_events WHERE campaign_id = ? ORDER BY occurred_at DESC LIMIT ?
        "#,
    )
    .bind(campaign_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(tracking_from_row).collect()
}

/// Events that could not be attributed to any campaign but belong to a
/// recipient of this campaign. Included in the campaign event feed so
/// engagement that raced campaign resolution still shows up.
pub async fn list_orphaned_events_for_campaign(
    pool: &SqlitePool,
    campaign_id: Uuid,
    limit: i64,
) -> Result<Vec<EmailTrackingEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT t.id, t.campaign_id, t.email, t.event_type, t.provider_message_id, t.payload, t.occurred_at
        FROM email_tracking_events t
        WHERE t.campaign_id IS NULL
          AND t.email IN (
              SELECT c.email FROM contacts c
              JOIN outbound_messages m ON m.contact_id = c.id
              WHERE m.campaign_id = ?
          )
        ORDER BY t.occurred_at DESC LIMIT ?
        "#,
    )
    .bind(campaign_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(tracking_from_row).collect()
}

fn tracking_from_row(row: sqlx::sqlite::SqliteRow) -> Result<EmailTrackingEvent> {
    let campaign_id: Option<String> = row.try_get("campaign_id")?;
    let payload: Option<String> = row.try_get("payload")?;
    Ok(EmailTrackingEvent {
        id: parse_uuid(row.try_get("id")?)?,
        campaign_id: parse_opt_uuid(campaign_id.as_deref())?,
        email: row.try_get("email")?,
        event_type: row.try_get("event_type")?,
        provider_message_id: row.try_get("provider_message_id")?,
        payload: parse_opt_json(payload.as_deref())?,
        occurred_at: parse_ts(row.try_get("occurred_at")?)?,
    })
}
