//! Prompt parsing agent
//!
//! Extracts structured campaign fields from the free-text prompt via the
//! LLM. Best effort: when the model is unreachable or returns junk, the
//! campaign keeps its derived name and empty filters and the pipeline moves
//! on.

use outreach_common::models::{normalize_platform, Campaign};

use crate::AppState;

const MAX_NAME_CHARS: usize = 255;

/// Parse the campaign prompt into name, platform, and audience filters.
pub async fn parse(state: &AppState, campaign: &mut Campaign) {
    let prompt = build_prompt(&campaign.prompt);
    match state.llm.generate_json(&prompt).await {
        Ok(parsed) => {
            apply_parsed(campaign, &parsed);
            tracing::info!(campaign_id = %campaign.id, "Prompt parsed");
        }
        Err(err) => {
            tracing::warn!(
                campaign_id = %campaign.id,
                error = %err,
                "Prompt parsing failed, keeping derived fields"
            );
        }
    }
}

fn build_prompt(campaign_prompt: &str) -> String {
    format!(
        "Extract outreach campaign fields from this request:\n\n\"{}\"\n\n\
         Respond with only a JSON object in this exact shape:\n\
         {{\n\
           \"name\": \"short campaign name\",\n\
           \"platform\": \"email | linkedin | phone | sms\",\n\
           \"role_filters\": [\"job roles to target\"],\n\
           \"location_filters\": [\"locations to target\"],\n\
           \"category_filters\": [\"industry categories to target\"],\n\
           \"company_filters\": [\"specific companies to target\"]\n\
         }}\n\
         Use empty arrays for anything the request does not mention.",
        campaign_prompt
    )
}

/// Apply the parsed object to the campaign. Filters are only taken when the
/// campaign does not already have them, so operator-supplied filters win.
pub fn apply_parsed(campaign: &mut Campaign, parsed: &serde_json::Value) {
    if let Some(name) = parsed.get("name").and_then(|v| v.as_str()) {
        let name = name.trim();
        if !name.is_empty() {
            campaign.name = name.chars().take(MAX_NAME_CHARS).collect();
        }
    }
    if let Some(platform) = parsed.get("platform").and_then(|v| v.as_str()) {
        campaign.platform = normalize_platform(Some(platform));
    }
    for (field, target) in [
        ("role_filters", &mut campaign.role_filters),
        ("location_filters", &mut campaign.location_filters),
        ("category_filters", &mut campaign.category_filters),
        ("company_filters", &mut campaign.company_filters),
    ] {
        if !target.is_empty() {
            continue;
        }
        if let Some(values) = parsed.get(field).and_then(|v| v.as_array()) {
            *target = values
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parsed_fields_fill_the_campaign() {
        let mut campaign = Campaign::from_prompt("reach fintech CTOs in Pune", None, true);
        apply_parsed(
            &mut campaign,
            &json!({
                "name": "Fintech CTO outreach",
                "platform": "linkedin",
                "role_filters": ["CTO", " VP Engineering "],
                "location_filters": ["Pune"],
                "category_filters": [],
                "company_filters": []
            }),
        );

        assert_eq!(campaign.name, "Fintech CTO outreach");
        assert_eq!(campaign.platform, "linkedin");
        assert_eq!(campaign.role_filters, vec!["CTO", "VP Engineering"]);
        assert_eq!(campaign.location_filters, vec!["Pune"]);
        assert!(campaign.category_filters.is_empty());
    }

    #[test]
    fn existing_filters_are_not_overwritten() {
        let mut campaign = Campaign::from_prompt("reach CTOs", None, true);
        campaign.role_filters = vec!["Founder".to_string()];
        apply_parsed(&mut campaign, &json!({ "role_filters": ["CTO"] }));
        assert_eq!(campaign.role_filters, vec!["Founder"]);
    }

    #[test]
    fn junk_values_are_ignored() {
        let mut campaign = Campaign::from_prompt("reach CTOs", None, true);
        let original_name = campaign.name.clone();
        apply_parsed(
            &mut campaign,
            &json!({ "name": "  ", "platform": "carrier pigeon", "role_filters": "CTO" }),
        );
        assert_eq!(campaign.name, original_name);
        assert_eq!(campaign.platform, "email");
        assert!(campaign.role_filters.is_empty());
    }

    #[test]
    fn long_names_are_truncated() {
        let mut campaign = Campaign::from_prompt("x", None, true);
        apply_parsed(&mut campaign, &json!({ "name": "n".repeat(300) }));
        assert_eq!(campaign.name.chars().count(), 255);
    }
}
