//! Outbound message persistence and campaign resolution lookups

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use outreach_common::models::{Channel, MessageStatus, OutboundMessage};
use outreach_common::Result;

use super::{parse_opt_ts, parse_ts, parse_uuid};

pub async fn insert_message(pool: &SqlitePool, message: &OutboundMessage) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO outbound_messages (
            id, campaign_id, contact_id, channel, status,
            provider_message_id, subject, body, error_message, sent_at, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(message.id.to_string())
    .bind(message.campaign_id.to_string())
    .bind(message.contact_id.to_string())
    .bind(message.channel.as_str())
    .bind(message.status.as_str())
    .bind(&message.provider_message_id)
    .bind(&message.subject)
    .bind(&message.body)
    .bind(&message.error_message)
    .bind(message.sent_at.map(|t| t.to_rfc3339()))
    .bind(message.created_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

/// Dispatch idempotency check: has this contact already received a SENT
/// message for this campaign and channel?
pub async fn has_sent_message(
    pool: &SqlitePool,
    campaign_id: Uuid,
    contact_id: Uuid,
    channel: Channel,
) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM outbound_messages
        WHERE campaign_id = ? AND contact_id = ? AND channel = ? AND status = 'SENT'
        "#,
    )
    .bind(campaign_id.to_string())
    .bind(contact_id.to_string())
    .bind(channel.as_str())
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Messages for a campaign, newest first
pub async fn list_messages(
    pool: &SqlitePool,
    campaign_id: Uuid,
    limit: i64,
) -> Result<Vec<OutboundMessage>> {
    let rows = sqlx::query(
        r#"
        SELECT id, campaign_id, contact_id, channel, status,
               provider_message_id, subject, body, error_message, sent_at, created_at
        FROM outbound_messages WHERE campaign_id = ? ORDER BY created_at DESC LIMIT ?
        "#,
    )
    .bind(campaign_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(message_from_row).collect()
}

/// Resolve a campaign from a provider message id prefix. Providers append a
/// suffix after a dot, so the stored id is matched with a LIKE on the prefix.
pub async fn campaign_for_provider_message(
    pool: &SqlitePool,
    provider_message_id: &str,
) -> Result<Option<(Uuid, Uuid)>> {
    let prefix = provider_message_id
        .split('.')
        .next()
        .unwrap_or(provider_message_id);

    let row = sqlx::query(
        r#"
        SELECT campaign_id, contact_id FROM outbound_messages
        WHERE provider_message_id LIKE ? ORDER BY created_at DESC LIMIT 1
        "#,
    )
    .bind(format!("{}%", prefix))
    .fetch_optional(pool)
    .await?;

    row.map(|r| {
        Ok((
            parse_uuid(r.try_get("campaign_id")?)?,
            parse_uuid(r.try_get("contact_id")?)?,
        ))
    })
    .transpose()
}

/// Resolve a campaign from a recipient address: the campaign of the most
/// recent outbound email to that contact.
pub async fn latest_campaign_for_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<(Uuid, Uuid)>> {
    let row = sqlx::query(
        r#"
        SELECT m.campaign_id, m.contact_id
        FROM outbound_messages m
        JOIN contacts c ON c.id = m.contact_id
        WHERE c.email = ? AND m.channel = 'Email'
        ORDER BY m.created_at DESC LIMIT 1
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    row.map(|r| {
        Ok((
            parse_uuid(r.try_get("campaign_id")?)?,
            parse_uuid(r.try_get("contact_id")?)?,
        ))
    })
    .transpose()
}

fn message_from_row(row: sqlx::sqlite::SqliteRow) -> Result<OutboundMessage> {
    Ok(OutboundMessage {
        id: parse_uuid(row.try_get("id")?)?,
        campaign_id: parse_uuid(row.try_get("campaign_id")?)?,
        contact_id: parse_uuid(row.try_get("contact_id")?)?,
        channel: Channel::parse(row.try_get("channel")?)?,
        status: MessageStatus::parse(row.try_get("status")?)?,
        provider_message_id: row.try_get("provider_message_id")?,
        subject: row.try_get("subject")?,
        body: row.try_get("body")?,
        error_message: row.try_get("error_message")?,
        sent_at: parse_opt_ts(row.try_get("sent_at")?)?,
        created_at: parse_ts(row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{campaigns, contacts};
    use outreach_common::db::init_memory_database;
    use outreach_common::models::{Campaign, Contact};

    async fn seed(pool: &SqlitePool) -> (Campaign, Contact) {
        let campaign = Campaign::from_prompt("test", None, true);
        campaigns::insert_campaign(pool, &campaign).await.unwrap();
        let contact = Contact::new("Asha Rao", "asha@example.com");
        contacts::insert_contact(pool, &contact).await.unwrap();
        (campaign, contact)
    }

    #[tokio::test]
    async fn sent_messages_satisfy_idempotency_check() {
        let pool = init_memory_database().await.unwrap();
        let (campaign, contact) = seed(&pool).await;

        let mut msg = OutboundMessage::new(campaign.id, contact.id, Channel::Email);
        msg.mark_sent(Some("msgid.filter001".to_string()));
        insert_message(&pool, &msg).await.unwrap();

        assert!(has_sent_message(&pool, campaign.id, contact.id, Channel::Email)
            .await
            .unwrap());
        assert!(
            !has_sent_message(&pool, campaign.id, contact.id, Channel::Call)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn provider_message_prefix_resolves_campaign() {
        let pool = init_memory_database().await.unwrap();
        let (campaign, contact) = seed(&pool).await;

        let mut msg = OutboundMessage::new(campaign.id, contact.id, Channel::Email);
        msg.mark_sent(Some("msgid".to_string()));
        insert_message(&pool, &msg).await.unwrap();

        // Provider reports the id with an appended suffix
        let resolved = campaign_for_provider_message(&pool, "msgid.recvd-7")
            .await
            .unwrap();
        assert_eq!(resolved, Some((campaign.id, contact.id)));
    }

    #[tokio::test]
    async fn email_address_resolves_latest_campaign() {
        let pool = init_memory_database().await.unwrap();
        let (campaign, contact) = seed(&pool).await;

        let mut msg = OutboundMessage::new(campaign.id, contact.id, Channel::Email);
        msg.mark_sent(None);
        insert_message(&pool, &msg).await.unwrap();

        let resolved = latest_campaign_for_email(&pool, "asha@example.com")
            .await
            .unwrap();
        assert_eq!(resolved, Some((campaign.id, contact.id)));

        assert!(latest_campaign_for_email(&pool, "nobody@example.com")
            .await
            .unwrap()
            .is_none());
    }
}
