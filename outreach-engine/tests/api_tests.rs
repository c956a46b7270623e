//! HTTP surface tests against the full router with an in-memory database.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use outreach_common::config::Settings;
use outreach_common::db::init_memory_database;
use outreach_common::events::EventBus;
use outreach_common::models::{Campaign, Channel, Contact, OutboundMessage, PipelineState};
use outreach_engine::db;
use outreach_engine::{build_router, AppState};

async fn test_app() -> (Router, AppState) {
    let pool = init_memory_database().await.unwrap();
    let state = AppState::new(pool, EventBus::new(64), Settings::from_env());
    (build_router(state.clone()), state)
}

async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    body: Value,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn campaign_creation_is_accepted_and_starts_in_created() {
    let (app, _state) = test_app().await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/campaigns",
        json!({ "prompt": "Reach out to CTOs at fintech startups in Berlin" }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["pipeline_state"], "CREATED");
    assert!(body["name"].as_str().unwrap().starts_with("Reach out to CTOs"));
    assert_eq!(body["approval_required"], true);
}

#[tokio::test]
async fn empty_prompts_are_rejected() {
    let (app, _state) = test_app().await;
    let (status, body) =
        send_json(&app, "POST", "/api/campaigns", json!({ "prompt": "   " })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn unknown_campaigns_are_404() {
    let (app, _state) = test_app().await;
    let (status, body) = get_json(&app, &format!("/api/campaigns/{}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn campaigns_can_be_listed_and_fetched() {
    let (app, state) = test_app().await;
    let campaign = Campaign::from_prompt("quarterly outreach", None, true);
    db::campaigns::insert_campaign(&state.db, &campaign).await.unwrap();

    let (status, body) = get_json(&app, "/api/campaigns").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["campaigns"][0]["id"], campaign.id.to_string());

    let (status, body) = get_json(&app, &format!("/api/campaigns/{}", campaign.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prompt"], "quarterly outreach");
}

#[tokio::test]
async fn content_cannot_be_edited_before_review() {
    let (app, state) = test_app().await;
    let campaign = Campaign::from_prompt("too early", None, true);
    db::campaigns::insert_campaign(&state.db, &campaign).await.unwrap();

    let (status, body) = send_json(
        &app,
        "PUT",
        &format!("/api/campaigns/{}/content", campaign.id),
        json!({ "channel": "Email", "content": { "subject": "s", "body": "b" } }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_STATE");
}

#[tokio::test]
async fn approval_requires_awaiting_approval() {
    let (app, state) = test_app().await;
    let campaign = Campaign::from_prompt("not reviewed yet", None, true);
    db::campaigns::insert_campaign(&state.db, &campaign).await.unwrap();

    let (status, body) = send_json(
        &app,
        "POST",
        &format!("/api/campaigns/{}/approve", campaign.id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_STATE");
}

#[tokio::test]
async fn contacts_validate_and_reject_duplicates() {
    let (app, _state) = test_app().await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/contacts",
        json!({ "name": "Asha Rao", "email": "asha@example.com", "role": "CTO" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], "asha@example.com");

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/contacts",
        json!({ "name": "Asha Again", "email": "asha@example.com" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/contacts",
        json!({ "name": "No Email", "email": "not-an-email" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = get_json(&app, "/api/contacts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn tracking_events_resolve_through_the_provider_message_id() {
    let (app, state) = test_app().await;

    let campaign = Campaign::from_prompt("tracked campaign", None, true);
    db::campaigns::insert_campaign(&state.db, &campaign).await.unwrap();
    let contact = Contact::new("Ravi", "ravi@example.com");
    db::contacts::insert_contact(&state.db, &contact).await.unwrap();

    let mut message = OutboundMessage::new(campaign.id, contact.id, Channel::Email);
    message.mark_sent(Some("msg-123.filter001".to_string()));
    db::messages::insert_message(&state.db, &message).await.unwrap();

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/tracking/email-events",
        json!([
            { "event": "delivered", "email": "ravi@example.com", "sg_message_id": "msg-123.recv" },
            { "event": "open", "email": "ravi@example.com", "sg_message_id": "msg-123.recv" },
            { "event": "open", "email": "stranger@example.com" }
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed"], 3);
    assert_eq!(body["resolved"], 2);

    // Opens count as conversions
    assert_eq!(
        db::analytics::conversion_count(&state.db, campaign.id).await.unwrap(),
        1
    );

    let (status, body) = get_json(&app, &format!("/api/campaigns/{}/events", campaign.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["events"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn tracking_keeps_unattributed_events() {
    let (app, state) = test_app().await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/tracking/email-events",
        json!([{ "event": "click", "email": "nobody@example.com" }]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed"], 1);
    assert_eq!(body["resolved"], 0);

    // The raw event is persisted even without attribution
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM email_tracking_events")
        .fetch_one(&state.db)
        .await
        .unwrap();
    assert_eq!(n, 1);
}

#[tokio::test]
async fn analytics_report_funnel_and_rates() {
    let (app, state) = test_app().await;

    let campaign = Campaign::from_prompt("measured campaign", None, true);
    db::campaigns::insert_campaign(&state.db, &campaign).await.unwrap();
    let contact = Contact::new("Mira", "mira@example.com");
    db::contacts::insert_contact(&state.db, &contact).await.unwrap();

    let mut message = OutboundMessage::new(campaign.id, contact.id, Channel::Email);
    message.mark_sent(Some("msg-9.a".to_string()));
    db::messages::insert_message(&state.db, &message).await.unwrap();

    send_json(
        &app,
        "POST",
        "/api/tracking/email-events",
        json!([
            { "event": "delivered", "email": "mira@example.com", "sg_message_id": "msg-9.b" },
            { "event": "open", "email": "mira@example.com", "sg_message_id": "msg-9.b" }
        ]),
    )
    .await;

    let (status, body) =
        get_json(&app, &format!("/api/campaigns/{}/analytics", campaign.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["targeted_contacts"], 1);
    assert_eq!(body["total_sent"], 1);
    assert_eq!(body["channels"]["Email"]["delivered"], 1);
    assert_eq!(body["rates"]["delivery_rate"], 100.0);
    assert_eq!(body["rates"]["open_rate"], 100.0);
    assert_eq!(body["top_contacts"][0]["email"], "mira@example.com");
}

#[tokio::test]
async fn insights_aggregate_across_campaigns() {
    let (app, state) = test_app().await;

    for prompt in ["first", "second"] {
        let campaign = Campaign::from_prompt(prompt, None, true);
        db::campaigns::insert_campaign(&state.db, &campaign).await.unwrap();
    }
    let mut failed = Campaign::from_prompt("third", None, true);
    failed.pipeline_state = PipelineState::Failed;
    db::campaigns::insert_campaign(&state.db, &failed).await.unwrap();

    let (status, body) = get_json(&app, "/api/insights").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["campaigns"], 3);
    assert_eq!(body["pipeline_states"]["CREATED"], 2);
    assert_eq!(body["pipeline_states"]["FAILED"], 1);
}

#[tokio::test]
async fn voice_status_webhook_records_the_outcome() {
    let (app, state) = test_app().await;

    let campaign = Campaign::from_prompt("call campaign", None, true);
    db::campaigns::insert_campaign(&state.db, &campaign).await.unwrap();
    let mut contact = Contact::new("Dev", "dev@example.com");
    contact.phone = Some("+14155550100".to_string());
    db::contacts::insert_contact(&state.db, &contact).await.unwrap();

    let call = outreach_common::models::VoiceCall::new(campaign.id, contact.id, "CA-test-1");
    db::voice_calls::insert_call(&state.db, &call).await.unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/api/voice/status")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(
            "CallSid=CA-test-1&CallStatus=completed&CallDuration=42",
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let reloaded = db::voice_calls::require_call_by_sid(&state.db, "CA-test-1")
        .await
        .unwrap();
    assert_eq!(
        reloaded.status,
        outreach_common::models::CallStatus::Answered
    );
    assert_eq!(reloaded.duration_seconds, Some(42));

    let avg = db::analytics::avg_call_duration(&state.db, campaign.id)
        .await
        .unwrap();
    assert_eq!(avg, Some(42.0));
}
