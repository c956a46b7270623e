//! Pipeline state machine types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Campaign pipeline stage.
///
/// Transitions are forward-only along the line below; `Failed` is reachable
/// from any state. Regeneration re-enters `ContentGenerated` from
/// `AwaitingApproval` or `Failed`.
///
/// CREATED → CLASSIFIED → CONTACTS_RETRIEVED → CHANNEL_DECIDED →
/// CONTENT_GENERATED → AWAITING_APPROVAL → APPROVED → DISPATCHED → COMPLETED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Created,
    Classified,
    ContactsRetrieved,
    ChannelDecided,
    ContentGenerated,
    AwaitingApproval,
    Approved,
    Dispatched,
    Completed,
    Failed,
}

impl PipelineState {
    /// Stable string form, matching the persisted column values.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Created => "CREATED",
            PipelineState::Classified => "CLASSIFIED",
            PipelineState::ContactsRetrieved => "CONTACTS_RETRIEVED",
            PipelineState::ChannelDecided => "CHANNEL_DECIDED",
            PipelineState::ContentGenerated => "CONTENT_GENERATED",
            PipelineState::AwaitingApproval => "AWAITING_APPROVAL",
            PipelineState::Approved => "APPROVED",
            PipelineState::Dispatched => "DISPATCHED",
            PipelineState::Completed => "COMPLETED",
            PipelineState::Failed => "FAILED",
        }
    }

    /// Parse the persisted column value.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "CREATED" => Ok(PipelineState::Created),
            "CLASSIFIED" => Ok(PipelineState::Classified),
            "CONTACTS_RETRIEVED" => Ok(PipelineState::ContactsRetrieved),
            "CHANNEL_DECIDED" => Ok(PipelineState::ChannelDecided),
            "CONTENT_GENERATED" => Ok(PipelineState::ContentGenerated),
            "AWAITING_APPROVAL" => Ok(PipelineState::AwaitingApproval),
            "APPROVED" => Ok(PipelineState::Approved),
            "DISPATCHED" => Ok(PipelineState::Dispatched),
            "COMPLETED" => Ok(PipelineState::Completed),
            "FAILED" => Ok(PipelineState::Failed),
            other => Err(Error::Internal(format!("unknown pipeline state: {}", other))),
        }
    }

    /// Position in the forward pipeline, used for ordering checks.
    /// `Failed` has no position.
    pub fn ordinal(&self) -> Option<u8> {
        match self {
            PipelineState::Created => Some(0),
            PipelineState::Classified => Some(1),
            PipelineState::ContactsRetrieved => Some(2),
            PipelineState::ChannelDecided => Some(3),
            PipelineState::ContentGenerated => Some(4),
            PipelineState::AwaitingApproval => Some(5),
            PipelineState::Approved => Some(6),
            PipelineState::Dispatched => Some(7),
            PipelineState::Completed => Some(8),
            PipelineState::Failed => None,
        }
    }

    /// Terminal states end the pipeline run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }

    /// Content may be edited while it is under review.
    pub fn allows_content_edit(&self) -> bool {
        matches!(
            self,
            PipelineState::ContentGenerated | PipelineState::AwaitingApproval
        )
    }

    /// Regeneration is allowed while under review and as a recovery path
    /// from a failed run.
    pub fn allows_regeneration(&self) -> bool {
        matches!(
            self,
            PipelineState::ContentGenerated
                | PipelineState::AwaitingApproval
                | PipelineState::Failed
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound channel.
///
/// `review_order` defines the presentation order in the approval workflow
/// and the tie-break priority in channel decision: Email > LinkedIn > Call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    Email,
    LinkedIn,
    Call,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "Email",
            Channel::LinkedIn => "LinkedIn",
            Channel::Call => "Call",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Email" => Ok(Channel::Email),
            "LinkedIn" => Ok(Channel::LinkedIn),
            "Call" => Ok(Channel::Call),
            other => Err(Error::Internal(format!("unknown channel: {}", other))),
        }
    }

    /// All channels in review/priority order.
    pub fn review_order() -> [Channel; 3] {
        [Channel::Email, Channel::LinkedIn, Channel::Call]
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of the campaign pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub campaign_id: Uuid,
    /// State the campaign reached when the run ended (snapshot)
    pub state: PipelineState,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(campaign_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            state: PipelineState::Created,
            error_message: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Close the run with a final state snapshot.
    pub fn finish(&mut self, state: PipelineState, error_message: Option<String>) {
        self.state = state;
        self.error_message = error_message;
        self.ended_at = Some(Utc::now());
    }
}

/// Stage-level log row attached to a campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignLog {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub stage: String,
    pub level: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl CampaignLog {
    pub fn info(campaign_id: Uuid, stage: &str, message: impl Into<String>) -> Self {
        Self::new(campaign_id, stage, "INFO", message)
    }

    pub fn error(campaign_id: Uuid, stage: &str, message: impl Into<String>) -> Self {
        Self::new(campaign_id, stage, "ERROR", message)
    }

    fn new(campaign_id: Uuid, stage: &str, level: &str, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            stage: stage.to_string(),
            level: level.to_string(),
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_text() {
        for state in [
            PipelineState::Created,
            PipelineState::Classified,
            PipelineState::ContactsRetrieved,
            PipelineState::ChannelDecided,
            PipelineState::ContentGenerated,
            PipelineState::AwaitingApproval,
            PipelineState::Approved,
            PipelineState::Dispatched,
            PipelineState::Completed,
            PipelineState::Failed,
        ] {
            assert_eq!(PipelineState::parse(state.as_str()).unwrap(), state);
        }
    }

    #[test]
    fn forward_states_are_strictly_ordered() {
        let line = [
            PipelineState::Created,
            PipelineState::Classified,
            PipelineState::ContactsRetrieved,
            PipelineState::ChannelDecided,
            PipelineState::ContentGenerated,
            PipelineState::AwaitingApproval,
            PipelineState::Approved,
            PipelineState::Dispatched,
            PipelineState::Completed,
        ];
        for pair in line.windows(2) {
            assert!(pair[0].ordinal().unwrap() < pair[1].ordinal().unwrap());
        }
        assert!(PipelineState::Failed.ordinal().is_none());
    }

    #[test]
    fn edit_and_regeneration_windows() {
        assert!(PipelineState::ContentGenerated.allows_content_edit());
        assert!(PipelineState::AwaitingApproval.allows_content_edit());
        assert!(!PipelineState::Failed.allows_content_edit());
        assert!(PipelineState::Failed.allows_regeneration());
        assert!(!PipelineState::Approved.allows_regeneration());
    }

    #[test]
    fn channel_priority_favors_email() {
        let order = Channel::review_order();
        assert_eq!(order[0], Channel::Email);
        assert_eq!(order[1], Channel::LinkedIn);
        assert_eq!(order[2], Channel::Call);
    }
}
