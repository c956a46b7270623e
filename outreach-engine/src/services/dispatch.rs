//! Campaign dispatch
//!
//! Sends the approved per-channel templates to every assigned contact.
//! Placeholders are substituted at send time, after localization, so a
//! template edited during review flows through unchanged. Dispatch is
//! idempotent per (campaign, contact, channel): contacts that already have a
//! SENT message are skipped, which makes re-dispatch after a partial failure
//! safe.

use std::collections::HashMap;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use uuid::Uuid;

use outreach_common::events::CampaignEvent;
use outreach_common::models::{
    Campaign, CampaignLog, Channel, Contact, EngagementHistory, EngagementType, GeneratedContent,
    OutboundMessage, PipelineState, VoiceCall,
};
use outreach_common::{Error, Result};

use crate::db;
use crate::services::email::EmailMessage;
use crate::AppState;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([^\]]+)\]").unwrap_or_else(|e| panic!("invalid placeholder pattern: {}", e))
});

/// Substitute `[placeholder]` tokens in a template. Keys are normalized to
/// lowercase with spaces collapsed to underscores, so `[First Name]` and
/// `[first_name]` resolve identically. Unknown tokens are left untouched.
pub fn substitute(template: &str, tokens: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let key = caps[1].trim().to_lowercase().replace(' ', "_");
            match tokens.get(&key) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Token table for one contact within one campaign
pub fn tokens_for(campaign: &Campaign, contact: &Contact, sender_name: &str) -> HashMap<String, String> {
    let mut tokens = HashMap::new();
    tokens.insert("first_name".to_string(), contact.first_name().to_string());
    tokens.insert("name".to_string(), contact.name.clone());
    tokens.insert("email".to_string(), contact.email.clone());
    if let Some(company) = &contact.company {
        tokens.insert("company".to_string(), company.clone());
    }
    if let Some(role) = &contact.role {
        tokens.insert("role".to_string(), role.clone());
    }
    if let Some(location) = &contact.location {
        tokens.insert("location".to_string(), location.clone());
    }
    tokens.insert("campaign_name".to_string(), campaign.name.clone());
    tokens.insert("sender_name".to_string(), sender_name.to_string());
    tokens
}

fn template_field(template: &serde_json::Value, field: &str) -> String {
    template
        .get(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Entry point for spawned dispatch: failures mark the campaign FAILED.
pub async fn run_dispatch(state: AppState, campaign_id: Uuid) {
    if let Err(err) = dispatch_campaign(&state, campaign_id).await {
        tracing::error!(%campaign_id, error = %err, "Dispatch failed");
        if let Err(db_err) = db::campaigns::mark_failed(&state.db, campaign_id, &err.to_string()).await {
            tracing::error!(%campaign_id, error = %db_err, "Failed to record dispatch failure");
        }
        let _ = db::logs::insert_log(
            &state.db,
            &CampaignLog::error(campaign_id, "dispatch", err.to_string()),
        )
        .await;
        state.event_bus.emit_lossy(CampaignEvent::CampaignFailed {
            campaign_id,
            error: err.to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Dispatch an approved campaign across its channels, then mark it
/// COMPLETED. Individual send failures are recorded per message and do not
/// abort the rest of the batch.
pub async fn dispatch_campaign(state: &AppState, campaign_id: Uuid) -> Result<()> {
    let campaign = db::campaigns::require_campaign(&state.db, campaign_id).await?;
    if campaign.pipeline_state != PipelineState::Approved {
        return Err(Error::InvalidState(format!(
            "campaign {} is {}, expected APPROVED",
            campaign_id, campaign.pipeline_state
        )));
    }
    let content = campaign.generated_content.clone().ok_or_else(|| {
        Error::InvalidState(format!("campaign {} has no generated content", campaign_id))
    })?;

    advance(state, &campaign, PipelineState::Dispatched).await?;

    for channel in content.channels() {
        let (sent, failed) = dispatch_channel(state, &campaign, &content, channel).await?;
        tracing::info!(%campaign_id, %channel, sent, failed, "Channel dispatch finished");
        db::logs::insert_log(
            &state.db,
            &CampaignLog::info(
                campaign_id,
                "dispatch",
                format!("{}: {} sent, {} failed", channel, sent, failed),
            ),
        )
        .await?;
        state.event_bus.emit_lossy(CampaignEvent::DispatchProgress {
            campaign_id,
            channel,
            sent,
            failed,
            timestamp: Utc::now(),
        });
    }

    let dispatched = Campaign {
        pipeline_state: PipelineState::Dispatched,
        ..campaign
    };
    advance(state, &dispatched, PipelineState::Completed).await?;
    state.event_bus.emit_lossy(CampaignEvent::CampaignCompleted {
        campaign_id,
        timestamp: Utc::now(),
    });
    Ok(())
}

async fn advance(state: &AppState, campaign: &Campaign, to: PipelineState) -> Result<()> {
    db::campaigns::update_state(&state.db, campaign.id, to).await?;
    db::logs::insert_log(
        &state.db,
        &CampaignLog::info(campaign.id, "dispatch", format!("Pipeline advanced to {}", to)),
    )
    .await?;
    state.event_bus.emit_lossy(CampaignEvent::PipelineStateChanged {
        campaign_id: campaign.id,
        old_state: campaign.pipeline_state,
        new_state: to,
        timestamp: Utc::now(),
    });
    Ok(())
}

async fn dispatch_channel(
    state: &AppState,
    campaign: &Campaign,
    content: &GeneratedContent,
    channel: Channel,
) -> Result<(usize, usize)> {
    let template = match content.common.get(&channel) {
        Some(t) => t,
        None => return Ok((0, 0)),
    };
    let emails = content.contacts_for(channel);
    let contacts = db::contacts::get_contacts_by_emails(&state.db, &emails).await?;

    let mut sent = 0;
    let mut failed = 0;
    for contact in &contacts {
        if db::messages::has_sent_message(&state.db, campaign.id, contact.id, channel).await? {
            tracing::debug!(%campaign.id, contact = %contact.email, %channel, "Already sent, skipping");
            continue;
        }
        let delivered = match channel {
            Channel::Email => send_email(state, campaign, contact, template).await?,
            Channel::LinkedIn => record_linkedin(state, campaign, contact, template).await?,
            Channel::Call => place_call(state, campaign, contact).await?,
        };
        if delivered {
            sent += 1;
        } else {
            failed += 1;
        }
    }
    Ok((sent, failed))
}

async fn send_email(
    state: &AppState,
    campaign: &Campaign,
    contact: &Contact,
    template: &serde_json::Value,
) -> Result<bool> {
    let tokens = tokens_for(campaign, contact, &state.settings.sender_name);
    let subject_template = template_field(template, "subject");
    let body_template = template_field(template, "body");

    // Localize the template first so placeholders survive translation intact
    let localized_body = state.localizer.localize(&body_template, &contact.language).await;
    let localized_subject = state
        .localizer
        .localize(&subject_template, &contact.language)
        .await;
    let subject = substitute(&localized_subject, &tokens);
    let body = substitute(&localized_body, &tokens);

    let mut message = OutboundMessage::new(campaign.id, contact.id, Channel::Email);
    message.subject = Some(subject.clone());
    message.body = Some(body.clone());

    let outcome = state
        .email
        .send(&EmailMessage {
            to: contact.email.clone(),
            to_name: Some(contact.name.clone()),
            subject,
            body_html: body,
            campaign_id: Some(campaign.id),
        })
        .await;

    finish_send(state, campaign, contact, Channel::Email, message, outcome).await
}

/// LinkedIn has no send API here: the personalized message is prepared and
/// recorded as SENT for the operator to deliver.
async fn record_linkedin(
    state: &AppState,
    campaign: &Campaign,
    contact: &Contact,
    template: &serde_json::Value,
) -> Result<bool> {
    let tokens = tokens_for(campaign, contact, &state.settings.sender_name);
    let localized = state
        .localizer
        .localize(&template_field(template, "message"), &contact.language)
        .await;
    let body = substitute(&localized, &tokens);

    let mut message = OutboundMessage::new(campaign.id, contact.id, Channel::LinkedIn);
    message.body = Some(body);
    finish_send(state, campaign, contact, Channel::LinkedIn, message, Ok(None)).await
}

async fn place_call(state: &AppState, campaign: &Campaign, contact: &Contact) -> Result<bool> {
    let phone = match &contact.phone {
        Some(phone) => phone.clone(),
        None => {
            tracing::warn!(contact = %contact.email, "No phone number, skipping call");
            let mut message = OutboundMessage::new(campaign.id, contact.id, Channel::Call);
            message.mark_failed("contact has no phone number");
            db::messages::insert_message(&state.db, &message).await?;
            return Ok(false);
        }
    };

    let base = state.settings.public_base_url.trim_end_matches('/');
    let answer_url = format!(
        "{}/api/voice/answer?campaign_id={}&contact_id={}",
        base, campaign.id, contact.id
    );
    let status_url = format!(
        "{}/api/voice/status?campaign_id={}&contact_id={}",
        base, campaign.id, contact.id
    );

    let message = OutboundMessage::new(campaign.id, contact.id, Channel::Call);
    let outcome = state.telephony.initiate_call(&phone, &answer_url, &status_url).await;
    let outcome = match outcome {
        Ok(sid) => {
            db::voice_calls::insert_call(&state.db, &VoiceCall::new(campaign.id, contact.id, &sid))
                .await?;
            Ok(Some(sid))
        }
        Err(err) => Err(err),
    };
    finish_send(state, campaign, contact, Channel::Call, message, outcome).await
}

async fn finish_send(
    state: &AppState,
    campaign: &Campaign,
    contact: &Contact,
    channel: Channel,
    mut message: OutboundMessage,
    outcome: Result<Option<String>>,
) -> Result<bool> {
    match outcome {
        Ok(provider_message_id) => {
            message.mark_sent(provider_message_id);
            db::messages::insert_message(&state.db, &message).await?;
            db::engagement::insert_engagement(
                &state.db,
                &EngagementHistory::new(campaign.id, Some(contact.id), channel, EngagementType::Sent),
            )
            .await?;
            Ok(true)
        }
        Err(err) => {
            tracing::warn!(contact = %contact.email, %channel, error = %err, "Send failed");
            message.mark_failed(err.to_string());
            db::messages::insert_message(&state.db, &message).await?;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::campaigns;
    use outreach_common::config::Settings;
    use outreach_common::db::init_memory_database;
    use outreach_common::events::EventBus;
    use outreach_common::models::MessageStatus;

    #[test]
    fn substitution_normalizes_keys() {
        let mut tokens = HashMap::new();
        tokens.insert("first_name".to_string(), "Asha".to_string());
        tokens.insert("company".to_string(), "Acme".to_string());

        assert_eq!(
            substitute("Hi [First Name] of [company]!", &tokens),
            "Hi Asha of Acme!"
        );
    }

    #[test]
    fn unresolved_tokens_stay_in_place() {
        let tokens = HashMap::new();
        assert_eq!(substitute("Hi [first_name]", &tokens), "Hi [first_name]");
    }

    #[test]
    fn token_table_covers_contact_and_campaign() {
        let campaign = Campaign::from_prompt("Reach CTOs", None, true);
        let mut contact = Contact::new("Asha Rao", "asha@example.com");
        contact.company = Some("Acme".to_string());

        let tokens = tokens_for(&campaign, &contact, "Sales Team");
        assert_eq!(tokens["first_name"], "Asha");
        assert_eq!(tokens["company"], "Acme");
        assert_eq!(tokens["campaign_name"], "Reach CTOs");
        assert_eq!(tokens["sender_name"], "Sales Team");
        assert!(!tokens.contains_key("role"));
    }

    async fn approved_linkedin_campaign(state: &AppState) -> (Campaign, Contact) {
        let mut campaign = Campaign::from_prompt("LinkedIn outreach", Some("linkedin"), true);
        let contact = Contact::new("Asha Rao", "asha@example.com");
        db::contacts::insert_contact(&state.db, &contact).await.unwrap();

        let mut content = GeneratedContent::default();
        content.common.insert(
            Channel::LinkedIn,
            serde_json::json!({ "message": "Hi [first_name], let's connect." }),
        );
        content
            .contacts
            .insert(contact.email.clone(), Channel::LinkedIn);
        campaign.generated_content = Some(content);
        campaign.pipeline_state = PipelineState::Approved;
        campaigns::insert_campaign(&state.db, &campaign).await.unwrap();
        (campaign, contact)
    }

    #[tokio::test]
    async fn linkedin_dispatch_records_sent_and_completes() {
        let pool = init_memory_database().await.unwrap();
        let state = AppState::new(pool, EventBus::new(16), Settings::from_env());
        let (campaign, contact) = approved_linkedin_campaign(&state).await;

        dispatch_campaign(&state, campaign.id).await.unwrap();

        let reloaded = campaigns::require_campaign(&state.db, campaign.id).await.unwrap();
        assert_eq!(reloaded.pipeline_state, PipelineState::Completed);

        let messages = db::messages::list_messages(&state.db, campaign.id, 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, MessageStatus::Sent);
        assert_eq!(messages[0].contact_id, contact.id);
        assert_eq!(
            messages[0].body.as_deref(),
            Some("Hi Asha, let's connect.")
        );
    }

    #[tokio::test]
    async fn redispatch_skips_already_sent_contacts() {
        let pool = init_memory_database().await.unwrap();
        let state = AppState::new(pool, EventBus::new(16), Settings::from_env());
        let (campaign, _) = approved_linkedin_campaign(&state).await;

        dispatch_campaign(&state, campaign.id).await.unwrap();
        // Re-approve and dispatch again; the SENT row must not duplicate
        campaigns::update_state(&state.db, campaign.id, PipelineState::Approved)
            .await
            .unwrap();
        dispatch_campaign(&state, campaign.id).await.unwrap();

        let messages = db::messages::list_messages(&state.db, campaign.id, 10).await.unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn dispatch_requires_approved_state() {
        let pool = init_memory_database().await.unwrap();
        let state = AppState::new(pool, EventBus::new(16), Settings::from_env());
        let campaign = Campaign::from_prompt("not ready", None, true);
        campaigns::insert_campaign(&state.db, &campaign).await.unwrap();

        let err = dispatch_campaign(&state, campaign.id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }
}
