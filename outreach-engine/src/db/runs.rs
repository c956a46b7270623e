//! Pipeline run persistence

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use outreach_common::models::{PipelineRun, PipelineState};
use outreach_common::Result;

use super::{parse_opt_ts, parse_ts, parse_uuid};

pub async fn insert_run(pool: &SqlitePool, run: &PipelineRun) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO pipeline_runs (id, campaign_id, state, error_message, started_at, ended_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(run.id.to_string())
    .bind(run.campaign_id.to_string())
    .bind(run.state.as_str())
    .bind(&run.error_message)
    .bind(run.started_at.to_rfc3339())
    .bind(run.ended_at.map(|t| t.to_rfc3339()))
    .execute(pool)
    .await?;
    Ok(())
}

/// Record the final snapshot of a finished run
pub async fn finish_run(pool: &SqlitePool, run: &PipelineRun) -> Result<()> {
    sqlx::query("UPDATE pipeline_runs SET state = ?, error_message = ?, ended_at = ? WHERE id = ?")
        .bind(run.state.as_str())
        .bind(&run.error_message)
        .bind(run.ended_at.map(|t| t.to_rfc3339()))
        .bind(run.id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Runs for a campaign, newest first
pub async fn list_runs(pool: &SqlitePool, campaign_id: Uuid) -> Result<Vec<PipelineRun>> {
    let rows = sqlx::query(
        r#"
        SELECT id, campaign_id, state, error_message, started_at, ended_at
        FROM pipeline_runs WHERE campaign_id = ? ORDER BY started_at DESC
        "#,
    )
    .bind(campaign_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(PipelineRun {
                id: parse_uuid(row.try_get("id")?)?,
                campaign_id: parse_uuid(row.try_get("campaign_id")?)?,
                state: PipelineState::parse(row.try_get("state")?)?,
                error_message: row.try_get("error_message")?,
                started_at: parse_ts(row.try_get("started_at")?)?,
                ended_at: parse_opt_ts(row.try_get("ended_at")?)?,
            })
        })
        .collect()
}
