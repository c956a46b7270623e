//! Classification agent
//!
//! Maps the campaign prompt onto values that actually exist in the contact
//! database. Distinct samples of the filterable columns are cached on the
//! application state and shown to the LLM so the filters it produces match
//! real rows instead of invented ones. Best effort, like prompt parsing.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use outreach_common::models::Campaign;
use outreach_common::Result;

use crate::db::contacts::{column_samples, SAMPLE_COLUMNS};
use crate::AppState;

/// How long cached column samples stay fresh
const SAMPLE_TTL: Duration = Duration::from_secs(3600);
/// Distinct values fetched per column
const SAMPLES_PER_COLUMN: i64 = 80;
/// Values actually shown to the LLM per column
const SAMPLES_IN_PROMPT: usize = 40;

/// Cached distinct values of the filterable contact columns
#[derive(Debug, Clone)]
pub struct SchemaSample {
    pub columns: HashMap<String, Vec<String>>,
    pub fetched_at: Instant,
}

impl SchemaSample {
    pub fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < SAMPLE_TTL
    }
}

/// Fetch (or reuse) the column samples.
pub async fn schema_sample(state: &AppState) -> Result<SchemaSample> {
    {
        let cached = state.schema_sample.read().await;
        if let Some(sample) = cached.as_ref() {
            if sample.is_fresh() {
                return Ok(sample.clone());
            }
        }
    }

    let mut columns = HashMap::new();
    for column in SAMPLE_COLUMNS {
        let values = column_samples(&state.db, column, SAMPLES_PER_COLUMN).await?;
        columns.insert(column.to_string(), values);
    }
    let sample = SchemaSample {
        columns,
        fetched_at: Instant::now(),
    };
    *state.schema_sample.write().await = Some(sample.clone());
    tracing::debug!("Refreshed contact schema samples");
    Ok(sample)
}

/// Refine the campaign filters against real column values.
pub async fn classify(state: &AppState, campaign: &mut Campaign) {
    let sample = match schema_sample(state).await {
        Ok(sample) => sample,
        Err(err) => {
            tracing::warn!(
                campaign_id = %campaign.id,
                error = %err,
                "Could not sample contact columns, skipping classification"
            );
            return;
        }
    };

    let prompt = build_prompt(campaign, &sample);
    match state.llm.generate_json(&prompt).await {
        Ok(parsed) => {
            apply_filters(campaign, &parsed);
            tracing::info!(campaign_id = %campaign.id, "Campaign classified");
        }
        Err(err) => {
            tracing::warn!(
                campaign_id = %campaign.id,
                error = %err,
                "Classification failed, keeping existing filters"
            );
        }
    }
}

fn build_prompt(campaign: &Campaign, sample: &SchemaSample) -> String {
    let mut columns_block = String::new();
    for column in SAMPLE_COLUMNS {
        let values = sample
            .columns
            .get(column)
            .map(|v| &v[..v.len().min(SAMPLES_IN_PROMPT)])
            .unwrap_or(&[]);
        columns_block.push_str(&format!("{}: {}\n", column, values.join(", ")));
    }

    format!(
        "A contact database has these columns with example values:\n{}\n\
         Campaign request: \"{}\"\n\n\
         Pick the values from the lists above that match the request's target \
         audience. Respond with only a JSON object:\n\
         {{\"role_filters\": [], \"location_filters\": [], \
         \"category_filters\": [], \"company_filters\": []}}\n\
         Use empty arrays when no listed value matches.",
        columns_block, campaign.prompt
    )
}

/// Overwrite campaign filters with the classified ones. Unlike prompt
/// parsing, classification wins over earlier values because its output is
/// grounded in real column data; empty arrays leave the existing filters.
pub fn apply_filters(campaign: &mut Campaign, parsed: &serde_json::Value) {
    for (field, target) in [
        ("role_filters", &mut campaign.role_filters),
        ("location_filters", &mut campaign.location_filters),
        ("category_filters", &mut campaign.category_filters),
        ("company_filters", &mut campaign.company_filters),
    ] {
        if let Some(values) = parsed.get(field).and_then(|v| v.as_array()) {
            let cleaned: Vec<String> = values
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !cleaned.is_empty() {
                *target = cleaned;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::contacts::insert_contact;
    use outreach_common::config::Settings;
    use outreach_common::db::init_memory_database;
    use outreach_common::events::EventBus;
    use outreach_common::models::Contact;
    use serde_json::json;

    #[test]
    fn classified_filters_replace_existing_ones() {
        let mut campaign = Campaign::from_prompt("reach CTOs", None, true);
        campaign.role_filters = vec!["cto".to_string()];
        apply_filters(
            &mut campaign,
            &json!({ "role_filters": ["CTO", "Chief Technology Officer"], "location_filters": [] }),
        );
        assert_eq!(campaign.role_filters, vec!["CTO", "Chief Technology Officer"]);
        assert!(campaign.location_filters.is_empty());
    }

    #[test]
    fn empty_classification_keeps_existing_filters() {
        let mut campaign = Campaign::from_prompt("reach CTOs", None, true);
        campaign.role_filters = vec!["CTO".to_string()];
        apply_filters(&mut campaign, &json!({ "role_filters": [] }));
        assert_eq!(campaign.role_filters, vec!["CTO"]);
    }

    #[test]
    fn prompt_lists_a_bounded_number_of_samples() {
        let campaign = Campaign::from_prompt("reach CTOs", None, true);
        let mut columns = HashMap::new();
        columns.insert(
            "role".to_string(),
            (0..100).map(|i| format!("Role{}", i)).collect(),
        );
        let sample = SchemaSample {
            columns,
            fetched_at: Instant::now(),
        };

        let prompt = build_prompt(&campaign, &sample);
        assert!(prompt.contains("Role39"));
        assert!(!prompt.contains("Role40,"));
        assert!(!prompt.contains("Role99"));
    }

    #[tokio::test]
    async fn samples_are_cached_on_state() {
        let pool = init_memory_database().await.unwrap();
        let state = AppState::new(pool, EventBus::new(16), Settings::from_env());

        let mut contact = Contact::new("Asha", "asha@example.com");
        contact.role = Some("CTO".to_string());
        insert_contact(&state.db, &contact).await.unwrap();

        let sample = schema_sample(&state).await.unwrap();
        assert_eq!(sample.columns["role"], vec!["CTO"]);

        // A contact added after caching is not visible until the TTL expires
        let mut late = Contact::new("Ravi", "ravi@example.com");
        late.role = Some("CEO".to_string());
        insert_contact(&state.db, &late).await.unwrap();

        let cached = schema_sample(&state).await.unwrap();
        assert_eq!(cached.columns["role"], vec!["CTO"]);
    }
}
