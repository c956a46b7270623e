//! Telephony provider webhooks
//!
//! The provider calls back into these endpoints over the life of a call:
//! `/answer` when the callee picks up, `/turn` after each speech capture,
//! and `/status` when the call ends. The first two respond with TwiML.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use outreach_common::models::{CallStatus, Channel, EngagementHistory, EngagementType, VoiceCall};

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::{telephony, voice_agent};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/voice/answer", post(answer))
        .route("/api/voice/turn", post(turn))
        .route("/api/voice/status", post(status))
}

fn xml(body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        body,
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct AnswerQuery {
    campaign_id: Uuid,
    contact_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct AnswerForm {
    #[serde(rename = "CallSid")]
    call_sid: String,
}

/// POST /api/voice/answer - the callee picked up; greet them.
async fn answer(
    State(state): State<AppState>,
    Query(query): Query<AnswerQuery>,
    Form(form): Form<AnswerForm>,
) -> ApiResult<Response> {
    // Calls placed outside dispatch (provider console tests) have no row yet
    if db::voice_calls::get_call_by_sid(&state.db, &form.call_sid)
        .await?
        .is_none()
    {
        let call = VoiceCall::new(query.campaign_id, query.contact_id, &form.call_sid);
        db::voice_calls::insert_call(&state.db, &call).await?;
    }

    let outcome =
        voice_agent::open_call(&state, &form.call_sid, query.campaign_id, query.contact_id)
            .await?;
    let action_url = format!("{}/api/voice/turn", state.settings.public_base_url);
    Ok(xml(telephony::twiml_gather(
        &outcome.reply,
        outcome.language.voice,
        outcome.language.gather_language,
        &action_url,
    )))
}

#[derive(Debug, Deserialize)]
struct TurnForm {
    #[serde(rename = "CallSid")]
    call_sid: String,
    #[serde(rename = "SpeechResult", default)]
    speech_result: String,
}

/// POST /api/voice/turn - one captured utterance from the caller.
async fn turn(State(state): State<AppState>, Form(form): Form<TurnForm>) -> ApiResult<Response> {
    let outcome = voice_agent::handle_turn(&state, &form.call_sid, &form.speech_result).await?;
    if outcome.hangup {
        return Ok(xml(telephony::twiml_hangup(
            &outcome.reply,
            outcome.language.voice,
        )));
    }
    let action_url = format!("{}/api/voice/turn", state.settings.public_base_url);
    Ok(xml(telephony::twiml_gather(
        &outcome.reply,
        outcome.language.voice,
        outcome.language.gather_language,
        &action_url,
    )))
}

#[derive(Debug, Deserialize)]
struct StatusForm {
    #[serde(rename = "CallSid")]
    call_sid: String,
    #[serde(rename = "CallStatus")]
    call_status: String,
    #[serde(rename = "CallDuration")]
    call_duration: Option<i64>,
}

/// POST /api/voice/status - terminal status callback from the provider.
async fn status(
    State(state): State<AppState>,
    Form(form): Form<StatusForm>,
) -> ApiResult<StatusCode> {
    let Some(status) = CallStatus::from_provider_status(&form.call_status) else {
        return Err(ApiError::BadRequest(format!(
            "unknown call status: {}",
            form.call_status
        )));
    };
    let call = db::voice_calls::require_call_by_sid(&state.db, &form.call_sid).await?;

    let payload = form
        .call_duration
        .map(|seconds| json!({ "duration_seconds": seconds }));
    db::voice_calls::update_status(
        &state.db,
        &form.call_sid,
        status,
        form.call_duration,
        payload.as_ref(),
    )
    .await?;
    tracing::info!(call_sid = %form.call_sid, status = %form.call_status, "Call status updated");

    if status.is_terminal() {
        let engagement_type = if status == CallStatus::Answered {
            EngagementType::Answered
        } else {
            EngagementType::NotAnswered
        };
        let mut engagement = EngagementHistory::new(
            call.campaign_id,
            Some(call.contact_id),
            Channel::Call,
            engagement_type,
        );
        if let Some(payload) = payload {
            engagement = engagement.with_payload(payload);
        }
        db::engagement::insert_engagement(&state.db, &engagement).await?;

        // The call is over, its in-memory session can go
        state.voice_sessions.write().await.remove(&form.call_sid);

        state
            .event_bus
            .emit_lossy(outreach_common::events::CampaignEvent::StageLog {
                campaign_id: call.campaign_id,
                stage: "voice".to_string(),
                message: format!("call {} ended as {}", form.call_sid, status),
                timestamp: Utc::now(),
            });
    }

    Ok(StatusCode::OK)
}
