//! Cross-campaign insights endpoint

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::db;
use crate::error::ApiResult;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/insights", get(insights))
}

/// GET /api/insights - totals across all campaigns.
async fn insights(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let campaigns = db::campaigns::count_campaigns(&state.db).await?;
    let contacts = db::contacts::count_contacts(&state.db).await?;
    let pipeline_states = db::analytics::pipeline_state_counts(&state.db).await?;
    let engagement = db::analytics::engagement_totals(&state.db).await?;
    let channels = db::analytics::channel_totals(&state.db).await?;
    let events_last_24h = db::analytics::recent_event_count(&state.db).await?;

    Ok(Json(json!({
        "campaigns": campaigns,
        "contacts": contacts,
        "pipeline_states": pipeline_states,
        "engagement_totals": engagement,
        "channel_totals": channels,
        "events_last_24h": events_last_24h,
    })))
}
