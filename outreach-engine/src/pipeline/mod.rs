//! Campaign pipeline runner
//!
//! Executes the stages in order, persisting the campaign state and a log row
//! at every transition and emitting state-change events for SSE observers.
//! At most one run per campaign is in flight: a second start while one is
//! active is a no-op.
//!
//! Stage failures mark the campaign FAILED with the error recorded; the
//! prompt-parsing and classification agents are best-effort and degrade to
//! the campaign's existing filters instead of failing the run.

pub mod channel_decision;
pub mod classification;
pub mod contact_retrieval;
pub mod content;
pub mod prompt_parser;

use chrono::Utc;
use uuid::Uuid;

use outreach_common::events::CampaignEvent;
use outreach_common::models::{Campaign, CampaignLog, PipelineState};
use outreach_common::Result;

use crate::db;
use crate::services::dispatch;
use crate::AppState;

/// Entry point for a spawned pipeline run.
pub async fn run_pipeline(state: AppState, campaign_id: Uuid) {
    {
        let mut active = state.active_pipelines.write().await;
        if !active.insert(campaign_id) {
            tracing::warn!(%campaign_id, "Pipeline already running, ignoring start");
            return;
        }
    }

    let mut run = outreach_common::models::PipelineRun::new(campaign_id);
    if let Err(err) = db::runs::insert_run(&state.db, &run).await {
        tracing::error!(%campaign_id, error = %err, "Failed to record pipeline run");
    }

    let outcome = execute(&state, campaign_id).await;

    let (final_state, error_message) = match &outcome {
        Ok(reached) => (*reached, None),
        Err(err) => (PipelineState::Failed, Some(err.to_string())),
    };
    run.finish(final_state, error_message.clone());
    if let Err(err) = db::runs::finish_run(&state.db, &run).await {
        tracing::error!(%campaign_id, error = %err, "Failed to close pipeline run");
    }

    if let Err(err) = outcome {
        tracing::error!(%campaign_id, error = %err, "Pipeline failed");
        if let Err(db_err) = db::campaigns::mark_failed(&state.db, campaign_id, &err.to_string()).await
        {
            tracing::error!(%campaign_id, error = %db_err, "Failed to mark campaign FAILED");
        }
        let _ = db::logs::insert_log(
            &state.db,
            &CampaignLog::error(campaign_id, "pipeline", err.to_string()),
        )
        .await;
        state.event_bus.emit_lossy(CampaignEvent::CampaignFailed {
            campaign_id,
            error: err.to_string(),
            timestamp: Utc::now(),
        });
    }

    state.active_pipelines.write().await.remove(&campaign_id);
}

/// Run the stages in order. Returns the state the campaign reached.
async fn execute(state: &AppState, campaign_id: Uuid) -> Result<PipelineState> {
    let mut campaign = db::campaigns::require_campaign(&state.db, campaign_id).await?;

    // Agents refine the campaign in place; both degrade gracefully
    prompt_parser::parse(state, &mut campaign).await;
    classification::classify(state, &mut campaign).await;
    db::campaigns::update_campaign(&state.db, &campaign).await?;
    advance(state, &mut campaign, PipelineState::Classified, "classification").await?;

    let contacts = contact_retrieval::retrieve(state, &campaign).await?;
    stage_log(
        state,
        campaign_id,
        "contact_retrieval",
        format!("Retrieved {} contacts", contacts.len()),
    )
    .await?;
    advance(state, &mut campaign, PipelineState::ContactsRetrieved, "contact_retrieval").await?;

    let assignments = channel_decision::decide(state, &campaign, &contacts).await?;
    advance(state, &mut campaign, PipelineState::ChannelDecided, "channel_decision").await?;

    let content = content::generate(state, &campaign, &contacts, assignments).await?;
    db::campaigns::update_content(&state.db, campaign_id, &content).await?;
    campaign.generated_content = Some(content);
    advance(state, &mut campaign, PipelineState::ContentGenerated, "content").await?;

    if campaign.approval_required {
        advance(state, &mut campaign, PipelineState::AwaitingApproval, "approval").await?;
        return Ok(PipelineState::AwaitingApproval);
    }

    advance(state, &mut campaign, PipelineState::Approved, "approval").await?;
    dispatch::dispatch_campaign(state, campaign_id).await?;
    Ok(PipelineState::Completed)
}

/// Persist a state transition, log it, and broadcast it.
pub async fn advance(
    state: &AppState,
    campaign: &mut Campaign,
    to: PipelineState,
    stage: &str,
) -> Result<()> {
    let from = campaign.pipeline_state;
    db::campaigns::update_state(&state.db, campaign.id, to).await?;
    campaign.pipeline_state = to;
    stage_log(state, campaign.id, stage, format!("Pipeline advanced to {}", to)).await?;
    state.event_bus.emit_lossy(CampaignEvent::PipelineStateChanged {
        campaign_id: campaign.id,
        old_state: from,
        new_state: to,
        timestamp: Utc::now(),
    });
    Ok(())
}

async fn stage_log(
    state: &AppState,
    campaign_id: Uuid,
    stage: &str,
    message: String,
) -> Result<()> {
    tracing::info!(%campaign_id, stage, "{}", message);
    db::logs::insert_log(&state.db, &CampaignLog::info(campaign_id, stage, message.clone())).await?;
    state.event_bus.emit_lossy(CampaignEvent::StageLog {
        campaign_id,
        stage: stage.to_string(),
        message,
        timestamp: Utc::now(),
    });
    Ok(())
}
