//! Campaign REST endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use outreach_common::events::CampaignEvent;
use outreach_common::models::{Campaign, Channel, PipelineState};

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::pipeline;
use crate::services::dispatch;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/campaigns", post(create_campaign).get(list_campaigns))
        .route("/api/campaigns/:id", get(get_campaign))
        .route("/api/campaigns/:id/logs", get(get_logs))
        .route("/api/campaigns/:id/messages", get(get_messages))
        .route("/api/campaigns/:id/runs", get(get_runs))
        .route("/api/campaigns/:id/content", put(edit_content))
        .route("/api/campaigns/:id/approve", post(approve_campaign))
        .route(
            "/api/campaigns/:id/regenerate-content",
            post(regenerate_content),
        )
}

#[derive(Debug, Deserialize)]
struct CreateCampaignRequest {
    prompt: String,
    platform: Option<String>,
    #[serde(default)]
    auto_approve_content: bool,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

impl PageQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 200)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// POST /api/campaigns - create a campaign and start its pipeline.
async fn create_campaign(
    State(state): State<AppState>,
    Json(request): Json<CreateCampaignRequest>,
) -> ApiResult<(StatusCode, Json<Campaign>)> {
    if request.prompt.trim().is_empty() {
        return Err(ApiError::Validation("prompt must not be empty".to_string()));
    }

    let campaign = Campaign::from_prompt(
        &request.prompt,
        request.platform.as_deref(),
        !request.auto_approve_content,
    );
    db::campaigns::insert_campaign(&state.db, &campaign).await?;
    tracing::info!(campaign_id = %campaign.id, "Campaign created");

    tokio::spawn(pipeline::run_pipeline(state.clone(), campaign.id));

    Ok((StatusCode::ACCEPTED, Json(campaign)))
}

/// GET /api/campaigns - page through campaigns, newest first.
async fn list_campaigns(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let campaigns = db::campaigns::list_campaigns(&state.db, page.limit(), page.offset()).await?;
    let total = db::campaigns::count_campaigns(&state.db).await?;
    Ok(Json(json!({ "campaigns": campaigns, "total": total })))
}

async fn get_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Campaign>> {
    Ok(Json(db::campaigns::require_campaign(&state.db, id).await?))
}

async fn get_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    db::campaigns::require_campaign(&state.db, id).await?;
    let logs = db::logs::list_logs(&state.db, id, 200).await?;
    Ok(Json(json!({ "logs": logs })))
}

async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    db::campaigns::require_campaign(&state.db, id).await?;
    let messages = db::messages::list_messages(&state.db, id, 500).await?;
    Ok(Json(json!({ "messages": messages })))
}

async fn get_runs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    db::campaigns::require_campaign(&state.db, id).await?;
    let runs = db::runs::list_runs(&state.db, id).await?;
    Ok(Json(json!({ "runs": runs })))
}

#[derive(Debug, Deserialize)]
struct EditContentRequest {
    channel: Channel,
    content: serde_json::Value,
}

/// PUT /api/campaigns/:id/content - edit one channel's draft during review.
async fn edit_content(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<EditContentRequest>,
) -> ApiResult<Json<Campaign>> {
    let mut campaign = db::campaigns::require_campaign(&state.db, id).await?;
    if !campaign.pipeline_state.allows_content_edit() {
        return Err(ApiError::InvalidState(format!(
            "content cannot be edited in state {}",
            campaign.pipeline_state
        )));
    }

    let content = campaign
        .generated_content
        .as_mut()
        .ok_or_else(|| ApiError::InvalidState("campaign has no generated content".to_string()))?;
    if !content.common.contains_key(&request.channel) {
        return Err(ApiError::BadRequest(format!(
            "campaign has no {} draft",
            request.channel
        )));
    }
    content.common.insert(request.channel, request.content);

    db::campaigns::update_content(&state.db, id, content).await?;
    state.event_bus.emit_lossy(CampaignEvent::ContentUpdated {
        campaign_id: id,
        channel: request.channel,
        timestamp: Utc::now(),
    });
    Ok(Json(campaign))
}

/// POST /api/campaigns/:id/approve - approve the whole campaign and
/// dispatch it.
async fn approve_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Campaign>> {
    let mut campaign = db::campaigns::require_campaign(&state.db, id).await?;
    if campaign.pipeline_state != PipelineState::AwaitingApproval {
        return Err(ApiError::InvalidState(format!(
            "campaign is {}, expected AWAITING_APPROVAL",
            campaign.pipeline_state
        )));
    }

    pipeline::advance(&state, &mut campaign, PipelineState::Approved, "approval").await?;
    state.event_bus.emit_lossy(CampaignEvent::CampaignApproved {
        campaign_id: id,
        timestamp: Utc::now(),
    });
    tokio::spawn(dispatch::run_dispatch(state.clone(), id));
    Ok(Json(campaign))
}

#[derive(Debug, Deserialize)]
struct RegenerateRequest {
    channel: Channel,
}

/// POST /api/campaigns/:id/regenerate-content - replace one channel's draft
/// with a fresh generation. Also the recovery path for FAILED campaigns.
async fn regenerate_content(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RegenerateRequest>,
) -> ApiResult<Json<Campaign>> {
    let mut campaign = db::campaigns::require_campaign(&state.db, id).await?;
    if !campaign.pipeline_state.allows_regeneration() {
        return Err(ApiError::InvalidState(format!(
            "content cannot be regenerated in state {}",
            campaign.pipeline_state
        )));
    }

    let template = pipeline::content::regenerate(&state, &campaign, request.channel).await?;
    let content = campaign
        .generated_content
        .as_mut()
        .ok_or_else(|| ApiError::InvalidState("campaign has no generated content".to_string()))?;
    content.common.insert(request.channel, template);
    db::campaigns::update_content(&state.db, id, content).await?;

    // A regenerated FAILED campaign goes back under review
    if campaign.pipeline_state == PipelineState::Failed {
        db::campaigns::update_state(&state.db, id, PipelineState::AwaitingApproval).await?;
        campaign.pipeline_state = PipelineState::AwaitingApproval;
    }

    state.event_bus.emit_lossy(CampaignEvent::ContentUpdated {
        campaign_id: id,
        channel: request.channel,
        timestamp: Utc::now(),
    });
    Ok(Json(campaign))
}
