//! Campaign analytics endpoint

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use uuid::Uuid;

use outreach_common::models::Channel;

use crate::db;
use crate::db::analytics::ChannelStats;
use crate::error::ApiResult;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/campaigns/:id/analytics", get(campaign_analytics))
}

/// Percentage rounded to two decimals; None when the denominator is zero.
fn pct(numerator: i64, denominator: i64) -> Option<f64> {
    if denominator <= 0 {
        return None;
    }
    Some((numerator as f64 / denominator as f64 * 10_000.0).round() / 100.0)
}

fn rates(stats: &HashMap<Channel, ChannelStats>, conversions: i64) -> serde_json::Value {
    let email = stats.get(&Channel::Email).cloned().unwrap_or_default();
    let call = stats.get(&Channel::Call).cloned().unwrap_or_default();
    let total_sent: i64 = stats.values().map(|s| s.sent).sum();

    json!({
        "delivery_rate": pct(email.delivered, email.sent),
        "open_rate": pct(email.opened, email.delivered),
        "click_rate": pct(email.clicked, email.delivered),
        "click_to_open_rate": pct(email.clicked, email.opened),
        "bounce_rate": pct(email.bounced, email.sent),
        "answer_rate": pct(call.answered, call.sent),
        "conversion_rate": pct(conversions, total_sent),
    })
}

/// GET /api/campaigns/:id/analytics - funnel, rates, and highlights.
async fn campaign_analytics(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let campaign = db::campaigns::require_campaign(&state.db, id).await?;

    let stats = db::analytics::channel_stats(&state.db, id).await?;
    let targeted = db::analytics::targeted_contacts(&state.db, id).await?;
    let conversions = db::analytics::conversion_count(&state.db, id).await?;
    let avg_call_duration = db::analytics::avg_call_duration(&state.db, id).await?;
    let hourly = db::analytics::hourly_engagement(&state.db, id).await?;
    let top = db::analytics::top_contacts(&state.db, id).await?;

    let total_sent: i64 = stats.values().map(|s| s.sent).sum();
    let channels: HashMap<String, &ChannelStats> = stats
        .iter()
        .map(|(channel, s)| (channel.to_string(), s))
        .collect();

    let response = json!({
        "campaign_id": id,
        "campaign_name": campaign.name,
        "pipeline_state": campaign.pipeline_state,
        "targeted_contacts": targeted,
        "total_sent": total_sent,
        "reach_rate": pct(total_sent, targeted),
        "conversions": conversions,
        "channels": channels,
        "rates": rates(&stats, conversions),
        "avg_call_duration_seconds": avg_call_duration,
        "hourly_engagement": hourly
            .into_iter()
            .map(|(hour, n)| json!({ "hour": hour, "events": n }))
            .collect::<Vec<_>>(),
        "top_contacts": top
            .into_iter()
            .map(|(contact_id, name, email, n)| json!({
                "contact_id": contact_id,
                "name": name,
                "email": email,
                "events": n,
            }))
            .collect::<Vec<_>>(),
    });
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentages_round_and_guard_zero() {
        assert_eq!(pct(1, 3), Some(33.33));
        assert_eq!(pct(2, 2), Some(100.0));
        assert_eq!(pct(0, 10), Some(0.0));
        assert_eq!(pct(5, 0), None);
    }

    #[test]
    fn rates_come_from_the_email_and_call_funnels() {
        let mut stats = HashMap::new();
        stats.insert(
            Channel::Email,
            ChannelStats {
                sent: 10,
                delivered: 8,
                opened: 4,
                clicked: 2,
                answered: 0,
                bounced: 1,
            },
        );
        stats.insert(
            Channel::Call,
            ChannelStats {
                sent: 4,
                answered: 1,
                ..Default::default()
            },
        );

        let rates = rates(&stats, 2);
        assert_eq!(rates["delivery_rate"], 80.0);
        assert_eq!(rates["open_rate"], 50.0);
        assert_eq!(rates["click_to_open_rate"], 50.0);
        assert_eq!(rates["answer_rate"], 25.0);
        // 2 conversions over 14 sent
        assert_eq!(rates["conversion_rate"], 14.29);
    }
}
