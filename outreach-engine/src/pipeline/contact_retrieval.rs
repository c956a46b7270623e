//! Contact retrieval stage
//!
//! Turns the campaign filters into a contact list. Terms are normalized to
//! singular lowercase so "engineers in cities" still matches stored values.
//! When the full filter set matches nothing the filters are relaxed one
//! dimension at a time (company, then location, then category), and as a
//! last resort the highest-scoring contacts overall are used.

use outreach_common::models::{Campaign, Contact};
use outreach_common::{Error, Result};

use crate::db::contacts;
use crate::AppState;

/// Upper bound on contacts per campaign
const RETRIEVAL_LIMIT: i64 = 200;
/// Size of the last-resort top-scored fallback
const FALLBACK_LIMIT: i64 = 50;

/// Retrieve the audience for a campaign. Fails the pipeline only when the
/// database holds no usable contacts at all.
pub async fn retrieve(state: &AppState, campaign: &Campaign) -> Result<Vec<Contact>> {
    let roles = normalize_terms(&campaign.role_filters);
    let locations = normalize_terms(&campaign.location_filters);
    let categories = normalize_terms(&campaign.category_filters);
    let companies = normalize_terms(&campaign.company_filters);

    // Relaxation order: drop the most specific dimension first
    let attempts: [(&[String], &[String], &[String], &[String]); 4] = [
        (&roles, &locations, &categories, &companies),
        (&roles, &locations, &categories, &[]),
        (&roles, &[], &categories, &[]),
        (&roles, &[], &[], &[]),
    ];

    let mut relaxed = false;
    for (roles, locations, categories, companies) in attempts {
        if roles.is_empty() && locations.is_empty() && categories.is_empty() && companies.is_empty()
        {
            continue;
        }
        let found = contacts::search_contacts(
            &state.db,
            roles,
            locations,
            categories,
            companies,
            RETRIEVAL_LIMIT,
        )
        .await?;
        if !found.is_empty() {
            if relaxed {
                tracing::info!(
                    campaign_id = %campaign.id,
                    matched = found.len(),
                    "Filters relaxed to find contacts"
                );
            }
            return Ok(found);
        }
        relaxed = true;
    }

    // No filters at all, or nothing matched even relaxed: top-scored contacts
    let fallback = contacts::top_contacts(&state.db, FALLBACK_LIMIT).await?;
    if fallback.is_empty() {
        return Err(Error::InvalidInput(
            "no contacts matched the campaign filters".to_string(),
        ));
    }
    if campaign.has_filters() {
        tracing::warn!(
            campaign_id = %campaign.id,
            "No filter combination matched, falling back to top-scored contacts"
        );
    }
    Ok(fallback)
}

/// Normalize filter terms for LIKE matching: lowercase, trimmed, and
/// de-pluralized ("companies" keeps its stem via the "es" rule).
pub fn normalize_terms(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .map(|t| normalize_term(t))
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn normalize_term(term: &str) -> String {
    let term = term.trim().to_lowercase();
    if term.len() > 4 && term.ends_with("es") {
        term[..term.len() - 2].to_string()
    } else if term.len() > 3 && term.ends_with('s') {
        term[..term.len() - 1].to_string()
    } else {
        term
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outreach_common::config::Settings;
    use outreach_common::db::init_memory_database;
    use outreach_common::events::EventBus;
    use outreach_common::models::IcpResult;

    #[test]
    fn terms_are_depluralized() {
        assert_eq!(normalize_term("Engineers"), "engineer");
        assert_eq!(normalize_term("Companies"), "compani");
        assert_eq!(normalize_term("Sales"), "sal");
        assert_eq!(normalize_term("CTOs"), "cto");
        // Too short to strip
        assert_eq!(normalize_term("Ops"), "ops");
        assert_eq!(normalize_term("yes"), "yes");
    }

    async fn seeded_state() -> AppState {
        let pool = init_memory_database().await.unwrap();
        let state = AppState::new(pool, EventBus::new(16), Settings::from_env());

        for (name, email, role, location, score) in [
            ("Asha Rao", "asha@example.com", "Engineer", "Pune", 90.0),
            ("Ravi Iyer", "ravi@example.com", "Engineer", "Chennai", 70.0),
            ("Meera Shah", "meera@example.com", "Designer", "Pune", 50.0),
        ] {
            let mut contact = Contact::new(name, email);
            contact.role = Some(role.to_string());
            contact.location = Some(location.to_string());
            contacts::insert_contact(&state.db, &contact).await.unwrap();
            contacts::insert_icp_result(&state.db, &IcpResult::new(contact.id, score, None))
                .await
                .unwrap();
        }
        state
    }

    #[tokio::test]
    async fn plural_role_filter_matches_stored_roles() {
        let state = seeded_state().await;
        let mut campaign = Campaign::from_prompt("reach engineers", None, true);
        campaign.role_filters = vec!["Engineers".to_string()];

        let found = retrieve(&state, &campaign).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| c.role.as_deref() == Some("Engineer")));
    }

    #[tokio::test]
    async fn unmatched_location_is_relaxed_away() {
        let state = seeded_state().await;
        let mut campaign = Campaign::from_prompt("reach engineers in Berlin", None, true);
        campaign.role_filters = vec!["Engineer".to_string()];
        campaign.location_filters = vec!["Berlin".to_string()];

        // Nothing matches engineer+Berlin; relaxing the location finds both
        let found = retrieve(&state, &campaign).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn hopeless_filters_fall_back_to_top_scored() {
        let state = seeded_state().await;
        let mut campaign = Campaign::from_prompt("reach astronauts", None, true);
        campaign.role_filters = vec!["Astronaut".to_string()];

        let found = retrieve(&state, &campaign).await.unwrap();
        assert_eq!(found.len(), 3);
        // Ordered by buying probability
        assert_eq!(found[0].email, "asha@example.com");
    }

    #[tokio::test]
    async fn empty_database_is_an_error() {
        let pool = init_memory_database().await.unwrap();
        let state = AppState::new(pool, EventBus::new(16), Settings::from_env());
        let campaign = Campaign::from_prompt("anyone", None, true);

        assert!(matches!(
            retrieve(&state, &campaign).await,
            Err(Error::InvalidInput(_))
        ));
    }
}
