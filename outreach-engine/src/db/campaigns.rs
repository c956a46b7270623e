//! Campaign persistence

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use outreach_common::models::{Campaign, GeneratedContent, PipelineState};
use outreach_common::{Error, Result};

use super::{parse_ts, parse_uuid};

/// Insert a freshly created campaign
pub async fn insert_campaign(pool: &SqlitePool, campaign: &Campaign) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO campaigns (
            id, name, prompt, platform,
            role_filters, location_filters, category_filters, company_filters,
            pipeline_state, approval_required, generated_content, error_message,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(campaign.id.to_string())
    .bind(&campaign.name)
    .bind(&campaign.prompt)
    .bind(&campaign.platform)
    .bind(serde_json::to_string(&campaign.role_filters)?)
    .bind(serde_json::to_string(&campaign.location_filters)?)
    .bind(serde_json::to_string(&campaign.category_filters)?)
    .bind(serde_json::to_string(&campaign.company_filters)?)
    .bind(campaign.pipeline_state.as_str())
    .bind(campaign.approval_required as i64)
    .bind(
        campaign
            .generated_content
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    )
    .bind(&campaign.error_message)
    .bind(campaign.created_at.to_rfc3339())
    .bind(campaign.updated_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

/// Persist the mutable fields of a campaign (everything but id, prompt and
/// created_at)
pub async fn update_campaign(pool: &SqlitePool, campaign: &Campaign) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE campaigns SET
            name = ?, platform = ?,
            role_filters = ?, location_filters = ?, category_filters = ?, company_filters = ?,
            pipeline_state = ?, approval_required = ?, generated_content = ?, error_message = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&campaign.name)
    .bind(&campaign.platform)
    .bind(serde_json::to_string(&campaign.role_filters)?)
    .bind(serde_json::to_string(&campaign.location_filters)?)
    .bind(serde_json::to_string(&campaign.category_filters)?)
    .bind(serde_json::to_string(&campaign.company_filters)?)
    .bind(campaign.pipeline_state.as_str())
    .bind(campaign.approval_required as i64)
    .bind(
        campaign
            .generated_content
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    )
    .bind(&campaign.error_message)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(campaign.id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Update just the pipeline state
pub async fn update_state(pool: &SqlitePool, id: Uuid, state: PipelineState) -> Result<()> {
    sqlx::query("UPDATE campaigns SET pipeline_state = ?, updated_at = ? WHERE id = ?")
        .bind(state.as_str())
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Mark a campaign FAILED with its error message
pub async fn mark_failed(pool: &SqlitePool, id: Uuid, error: &str) -> Result<()> {
    sqlx::query(
        "UPDATE campaigns SET pipeline_state = ?, error_message = ?, updated_at = ? WHERE id = ?",
    )
    .bind(PipelineState::Failed.as_str())
    .bind(error)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Replace the generated content drafts
pub async fn update_content(
    pool: &SqlitePool,
    id: Uuid,
    content: &GeneratedContent,
) -> Result<()> {
    sqlx::query("UPDATE campaigns SET generated_content = ?, updated_at = ? WHERE id = ?")
        .bind(serde_json::to_string(content)?)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Fetch one campaign
pub async fn get_campaign(pool: &SqlitePool, id: Uuid) -> Result<Option<Campaign>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, prompt, platform,
               role_filters, location_filters, category_filters, company_filters,
               pipeline_state, approval_required, generated_content, error_message,
               created_at, updated_at
        FROM campaigns WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(campaign_from_row).transpose()
}

/// Fetch a campaign or fail with NotFound
pub async fn require_campaign(pool: &SqlitePool, id: Uuid) -> Result<Campaign> {
    get_campaign(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("campaign {}", id)))
}

/// Page of campaigns, newest first
pub async fn list_campaigns(pool: &SqlitePool, limit: i64, offset: i64) -> Result<Vec<Campaign>> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, prompt, platform,
               role_filters, location_filters, category_filters, company_filters,
               pipeline_state, approval_required, generated_content, error_message,
               created_at, updated_at
        FROM campaigns ORDER BY created_at DESC LIMIT ? OFFSET ?
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(campaign_from_row).collect()
}

pub async fn count_campaigns(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM campaigns")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn campaign_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Campaign> {
    let generated_content: Option<String> = row.try_get("generated_content")?;
    Ok(Campaign {
        id: parse_uuid(row.try_get("id")?)?,
        name: row.try_get("name")?,
        prompt: row.try_get("prompt")?,
        platform: row.try_get("platform")?,
        role_filters: serde_json::from_str(row.try_get("role_filters")?)?,
        location_filters: serde_json::from_str(row.try_get("location_filters")?)?,
        category_filters: serde_json::from_str(row.try_get("category_filters")?)?,
        company_filters: serde_json::from_str(row.try_get("company_filters")?)?,
        pipeline_state: PipelineState::parse(row.try_get("pipeline_state")?)?,
        approval_required: row.try_get::<i64, _>("approval_required")? != 0,
        generated_content: generated_content
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
        error_message: row.try_get("error_message")?,
        created_at: parse_ts(row.try_get("created_at")?)?,
        updated_at: parse_ts(row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use outreach_common::db::init_memory_database;
    use outreach_common::models::Channel;

    #[tokio::test]
    async fn campaign_round_trip() {
        let pool = init_memory_database().await.unwrap();
        let mut campaign = Campaign::from_prompt("Reach out to fintech CTOs in Mumbai", None, true);
        campaign.role_filters = vec!["cto".to_string()];
        insert_campaign(&pool, &campaign).await.unwrap();

        let loaded = require_campaign(&pool, campaign.id).await.unwrap();
        assert_eq!(loaded.name, campaign.name);
        assert_eq!(loaded.pipeline_state, PipelineState::Created);
        assert_eq!(loaded.role_filters, vec!["cto".to_string()]);
        assert!(loaded.approval_required);
    }

    #[tokio::test]
    async fn state_and_content_updates_persist() {
        let pool = init_memory_database().await.unwrap();
        let campaign = Campaign::from_prompt("Promote webinar", None, false);
        insert_campaign(&pool, &campaign).await.unwrap();

        update_state(&pool, campaign.id, PipelineState::Classified)
            .await
            .unwrap();

        let mut content = GeneratedContent::default();
        content.common.insert(
            Channel::Email,
            serde_json::json!({"subject": "Hi [first_name]", "body": "b", "cta_link": "https://x"}),
        );
        content
            .contacts
            .insert("a@example.com".to_string(), Channel::Email);
        update_content(&pool, campaign.id, &content).await.unwrap();

        let loaded = require_campaign(&pool, campaign.id).await.unwrap();
        assert_eq!(loaded.pipeline_state, PipelineState::Classified);
        let loaded_content = loaded.generated_content.unwrap();
        assert_eq!(loaded_content.channels(), vec![Channel::Email]);
    }

    #[tokio::test]
    async fn mark_failed_records_error() {
        let pool = init_memory_database().await.unwrap();
        let campaign = Campaign::from_prompt("Doomed", None, true);
        insert_campaign(&pool, &campaign).await.unwrap();

        mark_failed(&pool, campaign.id, "no contacts matched")
            .await
            .unwrap();

        let loaded = require_campaign(&pool, campaign.id).await.unwrap();
        assert_eq!(loaded.pipeline_state, PipelineState::Failed);
        assert_eq!(loaded.error_message.as_deref(), Some("no contacts matched"));
    }

    #[tokio::test]
    async fn missing_campaign_is_not_found() {
        let pool = init_memory_database().await.unwrap();
        let err = require_campaign(&pool, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
