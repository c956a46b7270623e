//! Campaign entity and generated content

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pipeline::{Channel, PipelineState};

/// Maximum characters of the prompt used to derive a campaign name
const NAME_FROM_PROMPT_CHARS: usize = 60;

/// Per-channel content drafts plus the per-contact channel assignment.
///
/// `common` holds one template per channel shared by every contact assigned
/// to that channel; placeholders in it are substituted at send time.
/// `contacts` maps contact email to the channel chosen for that contact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratedContent {
    #[serde(default)]
    pub common: BTreeMap<Channel, serde_json::Value>,
    #[serde(default)]
    pub contacts: BTreeMap<String, Channel>,
}

impl GeneratedContent {
    /// Channels with a draft, in review order.
    pub fn channels(&self) -> Vec<Channel> {
        Channel::review_order()
            .into_iter()
            .filter(|c| self.common.contains_key(c))
            .collect()
    }

    /// Contact emails assigned to a channel.
    pub fn contacts_for(&self, channel: Channel) -> Vec<String> {
        self.contacts
            .iter()
            .filter(|(_, c)| **c == channel)
            .map(|(email, _)| email.clone())
            .collect()
    }
}

/// Outbound campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    /// Free-text prompt the campaign was created from
    pub prompt: String,
    /// Platform hint: email | linkedin | phone | sms
    pub platform: String,
    pub role_filters: Vec<String>,
    pub location_filters: Vec<String>,
    pub category_filters: Vec<String>,
    pub company_filters: Vec<String>,
    pub pipeline_state: PipelineState,
    pub approval_required: bool,
    pub generated_content: Option<GeneratedContent>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Create a campaign from a prompt. The name is derived from the first
    /// 60 characters of the prompt; `approval_required` is the inverse of
    /// the caller's auto-approve flag.
    pub fn from_prompt(prompt: &str, platform: Option<&str>, approval_required: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name_from_prompt(prompt),
            prompt: prompt.to_string(),
            platform: normalize_platform(platform),
            role_filters: Vec::new(),
            location_filters: Vec::new(),
            category_filters: Vec::new(),
            company_filters: Vec::new(),
            pipeline_state: PipelineState::Created,
            approval_required,
            generated_content: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether any audience filter is populated.
    pub fn has_filters(&self) -> bool {
        !self.role_filters.is_empty()
            || !self.location_filters.is_empty()
            || !self.category_filters.is_empty()
            || !self.company_filters.is_empty()
    }
}

/// Derive a display name from the campaign prompt: the first 60 characters,
/// with a trailing ellipsis when truncated.
pub fn name_from_prompt(prompt: &str) -> String {
    let trimmed = prompt.trim();
    let taken: String = trimmed.chars().take(NAME_FROM_PROMPT_CHARS).collect();
    if trimmed.chars().count() > NAME_FROM_PROMPT_CHARS {
        format!("{}…", taken)
    } else if taken.is_empty() {
        "Untitled campaign".to_string()
    } else {
        taken
    }
}

/// Restrict the platform hint to the supported set, defaulting to email.
pub fn normalize_platform(platform: Option<&str>) -> String {
    match platform.map(|p| p.trim().to_lowercase()) {
        Some(p) if ["email", "linkedin", "phone", "sms"].contains(&p.as_str()) => p,
        _ => "email".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_truncates_long_prompts() {
        let prompt = "a".repeat(100);
        let name = name_from_prompt(&prompt);
        assert_eq!(name.chars().count(), 61);
        assert!(name.ends_with('…'));
    }

    #[test]
    fn name_keeps_short_prompts_verbatim() {
        assert_eq!(name_from_prompt("Reach out to CTOs"), "Reach out to CTOs");
        assert_eq!(name_from_prompt("   "), "Untitled campaign");
    }

    #[test]
    fn platform_falls_back_to_email() {
        // Via the models re-export, the path dependent crates import
        use crate::models::normalize_platform;

        assert_eq!(normalize_platform(Some("LinkedIn")), "linkedin");
        assert_eq!(normalize_platform(Some("fax")), "email");
        assert_eq!(normalize_platform(None), "email");
    }

    #[test]
    fn generated_content_groups_by_channel() {
        let mut content = GeneratedContent::default();
        content
            .common
            .insert(Channel::Call, serde_json::json!({"greeting": "hi"}));
        content
            .common
            .insert(Channel::Email, serde_json::json!({"subject": "s"}));
        content
            .contacts
            .insert("a@example.com".to_string(), Channel::Email);
        content
            .contacts
            .insert("b@example.com".to_string(), Channel::Call);

        assert_eq!(content.channels(), vec![Channel::Email, Channel::Call]);
        assert_eq!(content.contacts_for(Channel::Email), vec!["a@example.com"]);
    }
}
