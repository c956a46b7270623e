//! Voice call persistence
//!
//! The conversation_log column carries the serialized session, written after
//! every turn so a dropped session can be restored mid-call.

use sqlx::{Row, SqlitePool};

use outreach_common::models::{CallStatus, VoiceCall};
use outreach_common::{Error, Result};

use super::{parse_opt_json, parse_ts, parse_uuid};

pub async fn insert_call(pool: &SqlitePool, call: &VoiceCall) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO voice_calls (
            id, campaign_id, contact_id, call_sid, status, language,
            conversation_log, captured_email, duration_seconds, payload,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(call.id.to_string())
    .bind(call.campaign_id.to_string())
    .bind(call.contact_id.to_string())
    .bind(&call.call_sid)
    .bind(call.status.as_str())
    .bind(&call.language)
    .bind(
        call.conversation_log
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    )
    .bind(&call.captured_email)
    .bind(call.duration_seconds)
    .bind(call.payload.as_ref().map(serde_json::to_string).transpose()?)
    .bind(call.created_at.to_rfc3339())
    .bind(call.updated_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_call_by_sid(pool: &SqlitePool, call_sid: &str) -> Result<Option<VoiceCall>> {
    let row = sqlx::query(
        r#"
        SELECT id, campaign_id, contact_id, call_sid, status, language,
               conversation_log, captured_email, duration_seconds, payload,
               created_at, updated_at
        FROM voice_calls WHERE call_sid = ?
        "#,
    )
    .bind(call_sid)
    .fetch_optional(pool)
    .await?;

    row.map(call_from_row).transpose()
}

pub async fn require_call_by_sid(pool: &SqlitePool, call_sid: &str) -> Result<VoiceCall> {
    get_call_by_sid(pool, call_sid)
        .await?
        .ok_or_else(|| Error::NotFound(format!("voice call {}", call_sid)))
}

/// Persist the conversation session and active language after a turn
pub async fn save_conversation(
    pool: &SqlitePool,
    call_sid: &str,
    conversation_log: &serde_json::Value,
    language: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE voice_calls SET conversation_log = ?, language = ?, updated_at = ? WHERE call_sid = ?",
    )
    .bind(serde_json::to_string(conversation_log)?)
    .bind(language)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(call_sid)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record the provider's final status for a call
pub async fn update_status(
    pool: &SqlitePool,
    call_sid: &str,
    status: CallStatus,
    duration_seconds: Option<i64>,
    payload: Option<&serde_json::Value>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE voice_calls SET status = ?, duration_seconds = COALESCE(?, duration_seconds),
               payload = COALESCE(?, payload), updated_at = ?
        WHERE call_sid = ?
        "#,
    )
    .bind(status.as_str())
    .bind(duration_seconds)
    .bind(payload.map(serde_json::to_string).transpose()?)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(call_sid)
    .execute(pool)
    .await?;
    Ok(())
}

/// Store an email address captured during the call
pub async fn set_captured_email(pool: &SqlitePool, call_sid: &str, email: &str) -> Result<()> {
    sqlx::query("UPDATE voice_calls SET captured_email = ?, updated_at = ? WHERE call_sid = ?")
        .bind(email)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(call_sid)
        .execute(pool)
        .await?;
    Ok(())
}

fn call_from_row(row: sqlx::sqlite::SqliteRow) -> Result<VoiceCall> {
    let conversation_log: Option<String> = row.try_get("conversation_log")?;
    let payload: Option<String> = row.try_get("payload")?;
    Ok(VoiceCall {
        id: parse_uuid(row.try_get("id")?)?,
        campaign_id: parse_uuid(row.try_get("campaign_id")?)?,
        contact_id: parse_uuid(row.try_get("contact_id")?)?,
        call_sid: row.try_get("call_sid")?,
        status: CallStatus::parse(row.try_get("status")?)?,
        language: row.try_get("language")?,
        conversation_log: parse_opt_json(conversation_log.as_deref())?,
        captured_email: row.try_get("captured_email")?,
        duration_seconds: row.try_get("duration_seconds")?,
        payload: parse_opt_json(payload.as_deref())?,
        created_at: parse_ts(row.try_get("created_at")?)?,
        updated_at: parse_ts(row.try_get("updated_at")?)?,
    })
}
