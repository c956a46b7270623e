//! Email provider event webhook and the per-campaign event feed
//!
//! The provider posts batches of engagement events (delivered, open, click,
//! bounce, ...). Each raw event is persisted even when it cannot be
//! attributed to a campaign; attribution is attempted through several
//! fallbacks because provider payloads are inconsistent about what they
//! carry.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use outreach_common::models::{
    Channel, ConversionEvent, ConversionKind, EmailTrackingEvent, EngagementHistory, EngagementType,
};
use outreach_common::Result;

use crate::db;
use crate::error::ApiResult;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/tracking/email-events", post(ingest_email_events))
        .route("/api/campaigns/:id/events", get(campaign_event_feed))
}

/// POST /api/tracking/email-events - provider webhook, batched.
async fn ingest_email_events(
    State(state): State<AppState>,
    Json(events): Json<Vec<serde_json::Value>>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut processed = 0usize;
    let mut resolved = 0usize;

    for event in &events {
        processed += 1;
        let event_type = event
            .get("event")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let email = event
            .get("email")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let message_id = event.get("sg_message_id").and_then(|v| v.as_str());
        let occurred_at = event
            .get("timestamp")
            .and_then(|v| v.as_i64())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);

        let target = resolve_campaign(&state, event, email, message_id).await?;

        let tracking = EmailTrackingEvent {
            id: Uuid::new_v4(),
            campaign_id: target.map(|(campaign_id, _)| campaign_id),
            email: email.to_string(),
            event_type: event_type.to_string(),
            provider_message_id: message_id.map(|s| s.to_string()),
            payload: Some(event.clone()),
            occurred_at,
        };
        db::tracking::insert_tracking_event(&state.db, &tracking).await?;

        let Some((campaign_id, contact_id)) = target else {
            tracing::debug!(event_type, email, "Tracking event kept without campaign");
            continue;
        };
        resolved += 1;

        if let Some(engagement_type) = EngagementType::from_provider_event(event_type) {
            let engagement =
                EngagementHistory::new(campaign_id, contact_id, Channel::Email, engagement_type)
                    .with_payload(event.clone());
            db::engagement::insert_engagement(&state.db, &engagement).await?;

            if let Some(kind) = ConversionKind::from_engagement(engagement_type) {
                let conversion = ConversionEvent::new(campaign_id, contact_id, kind);
                db::engagement::insert_conversion(&state.db, &conversion).await?;
            }
        }
    }

    tracing::info!(processed, resolved, "Email tracking batch ingested");
    Ok(Json(json!({ "processed": processed, "resolved": resolved })))
}

/// Work out which campaign (and contact) a provider event belongs to.
///
/// Order: explicit campaign_id field, a campaign UUID smuggled through the
/// category list, the provider message id recorded at send time, and
/// finally the most recent campaign that emailed this address.
async fn resolve_campaign(
    state: &AppState,
    event: &serde_json::Value,
    email: &str,
    message_id: Option<&str>,
) -> Result<Option<(Uuid, Option<Uuid>)>> {
    let explicit = event
        .get("campaign_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .or_else(|| category_campaign(event));
    if let Some(campaign_id) = explicit {
        let contact_id = if email.is_empty() {
            None
        } else {
            db::contacts::get_contact_by_email(&state.db, email)
                .await?
                .map(|c| c.id)
        };
        return Ok(Some((campaign_id, contact_id)));
    }

    if let Some(message_id) = message_id {
        if let Some((campaign_id, contact_id)) =
            db::messages::campaign_for_provider_message(&state.db, message_id).await?
        {
            return Ok(Some((campaign_id, Some(contact_id))));
        }
    }

    if !email.is_empty() {
        if let Some((campaign_id, contact_id)) =
            db::messages::latest_campaign_for_email(&state.db, email).await?
        {
            return Ok(Some((campaign_id, Some(contact_id))));
        }
    }

    Ok(None)
}

/// Campaign UUIDs are sent along as a message category at dispatch time.
fn category_campaign(event: &serde_json::Value) -> Option<Uuid> {
    let value = event.get("category").or_else(|| event.get("categories"))?;
    match value {
        serde_json::Value::String(s) => Uuid::parse_str(s).ok(),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .find_map(|s| Uuid::parse_str(s).ok()),
        _ => None,
    }
}

/// GET /api/campaigns/:id/events - attributed engagement merged with
/// orphaned tracking events for the campaign's recipients, newest first.
async fn campaign_event_feed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    db::campaigns::require_campaign(&state.db, id).await?;

    let mut feed: Vec<(DateTime<Utc>, serde_json::Value)> = Vec::new();
    for event in db::engagement::list_engagement(&state.db, id, 500).await? {
        feed.push((
            event.occurred_at,
            json!({
                "source": "engagement",
                "channel": event.channel,
                "event_type": event.engagement_type,
                "contact_id": event.contact_id,
                "occurred_at": event.occurred_at,
            }),
        ));
    }
    for event in db::tracking::list_orphaned_events_for_campaign(&state.db, id, 200).await? {
        feed.push((
            event.occurred_at,
            json!({
                "source": "tracking",
                "channel": Channel::Email,
                "event_type": event.event_type,
                "email": event.email,
                "occurred_at": event.occurred_at,
            }),
        ));
    }
    feed.sort_by(|a, b| b.0.cmp(&a.0));

    let events: Vec<serde_json::Value> = feed.into_iter().map(|(_, value)| value).collect();
    Ok(Json(json!({ "events": events })))
}
