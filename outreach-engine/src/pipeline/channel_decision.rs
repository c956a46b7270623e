//! Channel decision stage
//!
//! Picks one outbound channel per contact from their engagement history.
//! Past events are weighted (a click or an answered call outweighs a
//! delivery), ties resolve by channel priority, and contacts with no history
//! default to Email. A contact without a phone number never gets the Call
//! channel.

use std::collections::{BTreeMap, HashMap};

use outreach_common::models::{Campaign, Channel, Contact, EngagementType};
use outreach_common::Result;

use crate::db::engagement;
use crate::AppState;

fn weight(event: EngagementType) -> i64 {
    match event {
        EngagementType::Click | EngagementType::Answered => 3,
        EngagementType::Open => 2,
        EngagementType::Delivered => 1,
        EngagementType::Bounce | EngagementType::Spam | EngagementType::Unsubscribe => -3,
        EngagementType::NotAnswered => -1,
        _ => 0,
    }
}

/// Weighted per-channel engagement score for one contact
pub fn score_channels(
    counts: &HashMap<(Channel, EngagementType), i64>,
) -> BTreeMap<Channel, i64> {
    let mut scores = BTreeMap::new();
    for ((channel, event), n) in counts {
        *scores.entry(*channel).or_insert(0) += weight(*event) * n;
    }
    scores
}

/// Pick the channel for one contact. `None` in the scores means no history.
pub fn pick_channel(scores: &BTreeMap<Channel, i64>, has_phone: bool) -> Channel {
    let mut best: Option<(Channel, i64)> = None;
    // review_order makes the iteration a stable tie-break: Email wins ties
    for channel in Channel::review_order() {
        if channel == Channel::Call && !has_phone {
            continue;
        }
        let score = *scores.get(&channel).unwrap_or(&0);
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((channel, score)),
        }
    }

    match best {
        Some((channel, score)) if score != 0 => channel,
        // All-zero scores mean no usable history: Email is the default
        _ => Channel::Email,
    }
}

/// Assign a channel to every retrieved contact, keyed by email.
pub async fn decide(
    state: &AppState,
    campaign: &Campaign,
    contacts: &[Contact],
) -> Result<BTreeMap<String, Channel>> {
    let mut assignments = BTreeMap::new();
    for contact in contacts {
        let counts = engagement::channel_event_counts(&state.db, contact.id).await?;
        let scores = score_channels(&counts);
        let channel = pick_channel(&scores, contact.phone.is_some());
        assignments.insert(contact.email.clone(), channel);
    }
    tracing::info!(
        campaign_id = %campaign.id,
        contacts = contacts.len(),
        "Channels decided"
    );
    Ok(assignments)
}
