//! Voice call entities and the recoverable conversation session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Voice call lifecycle, combining our own states with provider outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallStatus {
    Initiated,
    Ringing,
    InProgress,
    Answered,
    Busy,
    NoAnswer,
    Failed,
    Canceled,
    Completed,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Initiated => "INITIATED",
            CallStatus::Ringing => "RINGING",
            CallStatus::InProgress => "IN_PROGRESS",
            CallStatus::Answered => "ANSWERED",
            CallStatus::Busy => "BUSY",
            CallStatus::NoAnswer => "NO_ANSWER",
            CallStatus::Failed => "FAILED",
            CallStatus::Canceled => "CANCELED",
            CallStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "INITIATED" => Ok(CallStatus::Initiated),
            "RINGING" => Ok(CallStatus::Ringing),
            "IN_PROGRESS" => Ok(CallStatus::InProgress),
            "ANSWERED" => Ok(CallStatus::Answered),
            "BUSY" => Ok(CallStatus::Busy),
            "NO_ANSWER" => Ok(CallStatus::NoAnswer),
            "FAILED" => Ok(CallStatus::Failed),
            "CANCELED" => Ok(CallStatus::Canceled),
            "COMPLETED" => Ok(CallStatus::Completed),
            other => Err(Error::Internal(format!("unknown call status: {}", other))),
        }
    }

    /// Map a telephony provider's final status string.
    pub fn from_provider_status(status: &str) -> Option<Self> {
        match status {
            "queued" | "initiated" => Some(CallStatus::Initiated),
            "ringing" => Some(CallStatus::Ringing),
            "in-progress" => Some(CallStatus::InProgress),
            "completed" => Some(CallStatus::Answered),
            "busy" => Some(CallStatus::Busy),
            "no-answer" => Some(CallStatus::NoAnswer),
            "failed" => Some(CallStatus::Failed),
            "canceled" => Some(CallStatus::Canceled),
            _ => None,
        }
    }

    /// Whether the call has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Answered
                | CallStatus::Busy
                | CallStatus::NoAnswer
                | CallStatus::Failed
                | CallStatus::Canceled
                | CallStatus::Completed
        )
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A voice call row. `conversation_log` carries the serialized
/// [`VoiceSession`] so a dropped session can be restored mid-call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceCall {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub contact_id: Uuid,
    /// Provider call identifier, unique per call
    pub call_sid: String,
    pub status: CallStatus,
    pub language: String,
    pub conversation_log: Option<serde_json::Value>,
    pub captured_email: Option<String>,
    pub duration_seconds: Option<i64>,
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VoiceCall {
    pub fn new(campaign_id: Uuid, contact_id: Uuid, call_sid: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            contact_id,
            call_sid: call_sid.to_string(),
            status: CallStatus::Initiated,
            language: "en-US".to_string(),
            conversation_log: None,
            captured_email: None,
            duration_seconds: None,
            payload: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Who said a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Agent,
    Caller,
}

/// One utterance within a call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Agent,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn caller(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Caller,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Sub-state of the in-call email capture flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturePhase {
    /// Email capture not active
    #[default]
    Idle,
    /// Agent offered to email details, waiting for yes/no
    Offered,
    /// Waiting for the caller to spell out an address
    AwaitingEmail,
    /// Address heard, waiting for confirmation of the read-back
    Confirming,
}

/// In-call conversation state, keyed by call SID.
///
/// Serialized to the voice_calls row after every turn; restored from that
/// row when a turn arrives for a SID with no in-memory session (process
/// restart or a telephony session that was dropped and re-established).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSession {
    pub call_sid: String,
    pub campaign_id: Uuid,
    pub contact_id: Uuid,
    /// Active language code (see the language service)
    pub language: String,
    pub turns: Vec<ConversationTurn>,
    #[serde(default)]
    pub capture_phase: CapturePhase,
    /// Normalized address awaiting confirmation
    #[serde(default)]
    pub pending_email: Option<String>,
    /// Set once the agent has said its farewell
    #[serde(default)]
    pub closed: bool,
}

impl VoiceSession {
    pub fn new(call_sid: &str, campaign_id: Uuid, contact_id: Uuid, language: &str) -> Self {
        Self {
            call_sid: call_sid.to_string(),
            campaign_id,
            contact_id,
            language: language.to_string(),
            turns: Vec::new(),
            capture_phase: CapturePhase::Idle,
            pending_email: None,
            closed: false,
        }
    }

    /// Number of caller turns so far, used against the turn budget.
    pub fn caller_turns(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| t.speaker == Speaker::Caller)
            .count()
    }

    /// Serialize for the conversation_log column.
    pub fn to_log(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Restore from a conversation_log column value.
    pub fn from_log(log: &serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(log.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_status_mapping() {
        assert_eq!(
            CallStatus::from_provider_status("completed"),
            Some(CallStatus::Answered)
        );
        assert_eq!(
            CallStatus::from_provider_status("no-answer"),
            Some(CallStatus::NoAnswer)
        );
        assert_eq!(
            CallStatus::from_provider_status("busy"),
            Some(CallStatus::Busy)
        );
        assert_eq!(
            CallStatus::from_provider_status("canceled"),
            Some(CallStatus::Canceled)
        );
        assert_eq!(CallStatus::from_provider_status("warbling"), None);
    }

    #[test]
    fn session_round_trips_through_log() {
        let mut session =
            VoiceSession::new("CA123", Uuid::new_v4(), Uuid::new_v4(), "en-US");
        session.turns.push(ConversationTurn::agent("Hello!"));
        session.turns.push(ConversationTurn::caller("Who is this?"));
        session.capture_phase = CapturePhase::AwaitingEmail;
        session.pending_email = Some("a@b.com".to_string());

        let log = session.to_log().unwrap();
        let restored = VoiceSession::from_log(&log).unwrap();

        assert_eq!(restored.call_sid, session.call_sid);
        assert_eq!(restored.turns.len(), 2);
        assert_eq!(restored.capture_phase, CapturePhase::AwaitingEmail);
        assert_eq!(restored.pending_email.as_deref(), Some("a@b.com"));
        assert_eq!(restored.caller_turns(), 1);
    }

    #[test]
    fn old_logs_without_capture_fields_still_restore() {
        let log = serde_json::json!({
            "call_sid": "CA9",
            "campaign_id": Uuid::new_v4(),
            "contact_id": Uuid::new_v4(),
            "language": "en-US",
            "turns": []
        });
        let restored = VoiceSession::from_log(&log).unwrap();
        assert_eq!(restored.capture_phase, CapturePhase::Idle);
        assert!(!restored.closed);
    }
}
