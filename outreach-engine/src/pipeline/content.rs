//! Content generation stage
//!
//! Generates one template per channel that has assigned contacts. Templates
//! carry `[placeholder]` tokens substituted per contact at send time.
//! Every draft passes through the safety filter before it is accepted;
//! content the filter discards fails the stage, since a campaign with a
//! channel but nothing sendable on it cannot proceed.

use std::collections::BTreeMap;

use serde_json::json;

use outreach_common::models::{Campaign, Channel, Contact, GeneratedContent};
use outreach_common::{Error, Result};

use crate::services::safety;
use crate::AppState;

/// LinkedIn connection messages are hard-capped by the platform
pub const LINKEDIN_MESSAGE_CHARS: usize = 300;

/// Generate templates for every assigned channel.
pub async fn generate(
    state: &AppState,
    campaign: &Campaign,
    contacts: &[Contact],
    assignments: BTreeMap<String, Channel>,
) -> Result<GeneratedContent> {
    let audience = describe_audience(campaign, contacts);
    let mut common = BTreeMap::new();

    for channel in Channel::review_order() {
        if !assignments.values().any(|c| *c == channel) {
            continue;
        }
        let template = generate_channel(state, campaign, &audience, channel).await?;
        tracing::info!(campaign_id = %campaign.id, %channel, "Template generated");
        common.insert(channel, template);
    }

    Ok(GeneratedContent {
        common,
        contacts: assignments,
    })
}

async fn generate_channel(
    state: &AppState,
    campaign: &Campaign,
    audience: &str,
    channel: Channel,
) -> Result<serde_json::Value> {
    let prompt = match channel {
        Channel::Email => email_prompt(campaign, audience),
        Channel::LinkedIn => linkedin_prompt(campaign, audience),
        Channel::Call => call_prompt(campaign, audience),
    };
    let raw = state.llm.generate_json(&prompt).await?;
    shape_template(&raw, channel)
}

/// Regenerate one channel's template for a campaign under review.
pub async fn regenerate(
    state: &AppState,
    campaign: &Campaign,
    channel: Channel,
) -> Result<serde_json::Value> {
    let audience = campaign
        .generated_content
        .as_ref()
        .map(|c| format!("{} prospects", c.contacts_for(channel).len()))
        .unwrap_or_else(|| "the campaign audience".to_string());
    generate_channel(state, campaign, &audience, channel).await
}

/// Validate, safety-filter, and normalize a raw LLM template.
pub fn shape_template(raw: &serde_json::Value, channel: Channel) -> Result<serde_json::Value> {
    let field = |name: &str| -> String {
        raw.get(name)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string()
    };
    let cta_link = field("cta_link");

    match channel {
        Channel::Email => {
            let subject = field("subject");
            let raw_body = field("body");
            // Length rules apply to the generated text, before the filter
            // appends any compliance disclaimer
            safety::validate_email_template(&subject, &raw_body).map_err(Error::Provider)?;
            let (body, report) = safety::filter(&raw_body, "email");
            if body.is_empty() {
                return Err(Error::Provider(format!(
                    "generated email failed the safety filter (score {})",
                    report.score
                )));
            }
            Ok(json!({ "subject": subject, "body": body, "cta_link": cta_link }))
        }
        Channel::LinkedIn => {
            let (message, report) = safety::filter(&field("message"), "linkedin");
            if message.is_empty() {
                return Err(Error::Provider(format!(
                    "generated LinkedIn message failed the safety filter (score {})",
                    report.score
                )));
            }
            let message = truncate_chars(&message, LINKEDIN_MESSAGE_CHARS);
            Ok(json!({ "message": message, "cta_link": cta_link }))
        }
        Channel::Call => {
            let mut script = serde_json::Map::new();
            for section in ["greeting", "value_proposition", "objection_handling", "closing"] {
                let text = field(section);
                if text.is_empty() {
                    return Err(Error::Provider(format!(
                        "generated call script is missing the {} section",
                        section
                    )));
                }
                let (filtered, report) = safety::filter(&text, "call");
                if filtered.is_empty() {
                    return Err(Error::Provider(format!(
                        "generated call script failed the safety filter (score {})",
                        report.score
                    )));
                }
                script.insert(section.to_string(), json!(filtered));
            }
            script.insert("cta_link".to_string(), json!(cta_link));
            Ok(serde_json::Value::Object(script))
        }
    }
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max.saturating_sub(1)).collect::<String>() + "…"
    }
}

fn describe_audience(campaign: &Campaign, contacts: &[Contact]) -> String {
    let mut parts = Vec::new();
    if !campaign.role_filters.is_empty() {
        parts.push(format!("roles: {}", campaign.role_filters.join(", ")));
    }
    if !campaign.location_filters.is_empty() {
        parts.push(format!("locations: {}", campaign.location_filters.join(", ")));
    }
    if !campaign.category_filters.is_empty() {
        parts.push(format!("industries: {}", campaign.category_filters.join(", ")));
    }
    if parts.is_empty() {
        format!("{} prospects", contacts.len())
    } else {
        format!("{} prospects ({})", contacts.len(), parts.join("; "))
    }
}

const PLACEHOLDER_NOTE: &str = "You may use the placeholders [first_name], [company], [role], \
     [sender_name], and [campaign_name]; they are filled in per recipient at send time.";

fn email_prompt(campaign: &Campaign, audience: &str) -> String {
    format!(
        "Write a short, professional B2B outreach email for this campaign:\n\
         \"{}\"\nAudience: {}.\n{}\n\
         Respond with only a JSON object:\n\
         {{\"subject\": \"...\", \"body\": \"...\", \"cta_link\": \"https://...\"}}\n\
         The body is plain text with line breaks, under 150 words, with a \
         single clear call to action.",
        campaign.prompt, audience, PLACEHOLDER_NOTE
    )
}

fn linkedin_prompt(campaign: &Campaign, audience: &str) -> String {
    format!(
        "Write a LinkedIn connection message for this campaign:\n\
         \"{}\"\nAudience: {}.\n{}\n\
         Respond with only a JSON object:\n\
         {{\"message\": \"...\", \"cta_link\": \"https://...\"}}\n\
         The message must be friendly, specific, and under {} characters.",
        campaign.prompt, audience, PLACEHOLDER_NOTE, LINKEDIN_MESSAGE_CHARS
    )
}

fn call_prompt(campaign: &Campaign, audience: &str) -> String {
    format!(
        "Write a phone call script for this campaign:\n\
         \"{}\"\nAudience: {}.\n{}\n\
         Respond with only a JSON object:\n\
         {{\"greeting\": \"...\", \"value_proposition\": \"...\", \
         \"objection_handling\": \"...\", \"closing\": \"...\", \
         \"cta_link\": \"https://...\"}}\n\
         Each section is one or two spoken sentences, conversational, no lists.",
        campaign.prompt, audience, PLACEHOLDER_NOTE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_templates_are_validated_and_disclaimed() {
        let raw = json!({
            "subject": "A quick idea for [company]",
            "body": "Hi [first_name], we help teams like yours ship faster. Worth a look?",
            "cta_link": "https://example.com/demo"
        });
        let template = shape_template(&raw, Channel::Email).unwrap();
        assert_eq!(template["subject"], "A quick idea for [company]");
        // The email disclaimer is appended by the safety filter
        assert!(template["body"]
            .as_str()
            .unwrap()
            .contains("opt out of future communications"));
    }

    #[test]
    fn short_email_bodies_are_rejected() {
        let raw = json!({ "subject": "A real subject", "body": "" });
        assert!(shape_template(&raw, Channel::Email).is_err());
    }

    #[test]
    fn body_length_is_checked_before_the_disclaimer_pads_it() {
        // The appended disclaimer alone would satisfy the length rule; the
        // generated body on its own must not
        let raw = json!({ "subject": "A real subject", "body": "Hi there." });
        let err = shape_template(&raw, Channel::Email).unwrap_err();
        assert!(err.to_string().contains("at least 20 characters"));
    }

    #[test]
    fn linkedin_messages_are_capped() {
        let raw = json!({ "message": "x".repeat(400), "cta_link": "" });
        let template = shape_template(&raw, Channel::LinkedIn).unwrap();
        let message = template["message"].as_str().unwrap();
        assert!(message.chars().count() <= LINKEDIN_MESSAGE_CHARS);
        assert!(message.ends_with('…'));
    }

    #[test]
    fn call_scripts_need_every_section() {
        let raw = json!({
            "greeting": "Hi [first_name], this is [sender_name].",
            "value_proposition": "We help teams ship faster.",
            "closing": "Can I email you the details?"
        });
        // objection_handling missing
        assert!(shape_template(&raw, Channel::Call).is_err());
    }

    #[test]
    fn unsafe_phrases_are_scrubbed_from_drafts() {
        let raw = json!({
            "subject": "Our plan for you",
            "body": "Double your money with us. We bought your data but only use it well, promise."
        });
        let template = shape_template(&raw, Channel::Email).unwrap();
        let body = template["body"].as_str().unwrap();
        assert!(body.contains("[removed]"));
        assert!(!body.to_lowercase().contains("double your money"));
        assert!(!body.to_lowercase().contains("bought your data"));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        let truncated = truncate_chars(&"é".repeat(10), 5);
        assert_eq!(truncated.chars().count(), 5);
        assert!(truncated.ends_with('…'));
    }
}
