//! Outbound message and engagement entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pipeline::Channel;
use crate::{Error, Result};

/// Outbound message lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Pending,
    Sent,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "PENDING",
            MessageStatus::Sent => "SENT",
            MessageStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(MessageStatus::Pending),
            "SENT" => Ok(MessageStatus::Sent),
            "FAILED" => Ok(MessageStatus::Failed),
            other => Err(Error::Internal(format!("unknown message status: {}", other))),
        }
    }
}

/// One message sent (or attempted) to one contact over one channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub contact_id: Uuid,
    pub channel: Channel,
    pub status: MessageStatus,
    /// Message id assigned by the provider, when one was returned
    pub provider_message_id: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn new(campaign_id: Uuid, contact_id: Uuid, channel: Channel) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            contact_id,
            channel,
            status: MessageStatus::Pending,
            provider_message_id: None,
            subject: None,
            body: None,
            error_message: None,
            sent_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn mark_sent(&mut self, provider_message_id: Option<String>) {
        self.status = MessageStatus::Sent;
        self.provider_message_id = provider_message_id;
        self.sent_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = MessageStatus::Failed;
        self.error_message = Some(error.into());
    }
}

/// Engagement event category, covering both email provider events and
/// voice-call outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngagementType {
    Sent,
    Delivered,
    Open,
    Click,
    Bounce,
    Dropped,
    Deferred,
    Unsubscribe,
    Spam,
    Processed,
    Answered,
    NotAnswered,
}

impl EngagementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementType::Sent => "SENT",
            EngagementType::Delivered => "DELIVERED",
            EngagementType::Open => "OPEN",
            EngagementType::Click => "CLICK",
            EngagementType::Bounce => "BOUNCE",
            EngagementType::Dropped => "DROPPED",
            EngagementType::Deferred => "DEFERRED",
            EngagementType::Unsubscribe => "UNSUBSCRIBE",
            EngagementType::Spam => "SPAM",
            EngagementType::Processed => "PROCESSED",
            EngagementType::Answered => "ANSWERED",
            EngagementType::NotAnswered => "NOT_ANSWERED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "SENT" => Ok(EngagementType::Sent),
            "DELIVERED" => Ok(EngagementType::Delivered),
            "OPEN" => Ok(EngagementType::Open),
            "CLICK" => Ok(EngagementType::Click),
            "BOUNCE" => Ok(EngagementType::Bounce),
            "DROPPED" => Ok(EngagementType::Dropped),
            "DEFERRED" => Ok(EngagementType::Deferred),
            "UNSUBSCRIBE" => Ok(EngagementType::Unsubscribe),
            "SPAM" => Ok(EngagementType::Spam),
            "PROCESSED" => Ok(EngagementType::Processed),
            "ANSWERED" => Ok(EngagementType::Answered),
            "NOT_ANSWERED" => Ok(EngagementType::NotAnswered),
            other => Err(Error::Internal(format!(
                "unknown engagement type: {}",
                other
            ))),
        }
    }

    /// Map a provider email event name onto an engagement type.
    /// Unknown event names are not engagement-worthy.
    pub fn from_provider_event(event: &str) -> Option<Self> {
        match event {
            "delivered" => Some(EngagementType::Delivered),
            "open" => Some(EngagementType::Open),
            "click" => Some(EngagementType::Click),
            "bounce" => Some(EngagementType::Bounce),
            "dropped" => Some(EngagementType::Dropped),
            "deferred" => Some(EngagementType::Deferred),
            "unsubscribe" | "group_unsubscribe" => Some(EngagementType::Unsubscribe),
            "spam_report" => Some(EngagementType::Spam),
            "processed" => Some(EngagementType::Processed),
            _ => None,
        }
    }
}

/// One engagement event attributed to a campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementHistory {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub channel: Channel,
    pub engagement_type: EngagementType,
    pub payload: Option<serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
}

impl EngagementHistory {
    pub fn new(
        campaign_id: Uuid,
        contact_id: Option<Uuid>,
        channel: Channel,
        engagement_type: EngagementType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            contact_id,
            channel,
            engagement_type,
            payload: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Raw email provider event, kept even when no campaign could be resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTrackingEvent {
    pub id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub email: String,
    pub event_type: String,
    pub provider_message_id: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
}

/// Conversion categories derived from email engagement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversionKind {
    EmailOpen,
    EmailClick,
}

impl ConversionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionKind::EmailOpen => "EMAIL_OPEN",
            ConversionKind::EmailClick => "EMAIL_CLICK",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "EMAIL_OPEN" => Ok(ConversionKind::EmailOpen),
            "EMAIL_CLICK" => Ok(ConversionKind::EmailClick),
            other => Err(Error::Internal(format!("unknown conversion kind: {}", other))),
        }
    }

    pub fn from_engagement(engagement: EngagementType) -> Option<Self> {
        match engagement {
            EngagementType::Open => Some(ConversionKind::EmailOpen),
            EngagementType::Click => Some(ConversionKind::EmailClick),
            _ => None,
        }
    }
}

/// A conversion attributed to a campaign and contact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionEvent {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub kind: ConversionKind,
    pub occurred_at: DateTime<Utc>,
}

impl ConversionEvent {
    pub fn new(campaign_id: Uuid, contact_id: Option<Uuid>, kind: ConversionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            contact_id,
            kind,
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_events_map_to_engagement() {
        assert_eq!(
            EngagementType::from_provider_event("open"),
            Some(EngagementType::Open)
        );
        assert_eq!(
            EngagementType::from_provider_event("spam_report"),
            Some(EngagementType::Spam)
        );
        assert_eq!(EngagementType::from_provider_event("wandered_off"), None);
    }

    #[test]
    fn only_opens_and_clicks_convert() {
        assert_eq!(
            ConversionKind::from_engagement(EngagementType::Open),
            Some(ConversionKind::EmailOpen)
        );
        assert_eq!(
            ConversionKind::from_engagement(EngagementType::Click),
            Some(ConversionKind::EmailClick)
        );
        assert_eq!(ConversionKind::from_engagement(EngagementType::Bounce), None);
    }

    #[test]
    fn message_lifecycle() {
        let mut msg = OutboundMessage::new(Uuid::new_v4(), Uuid::new_v4(), Channel::Email);
        assert_eq!(msg.status, MessageStatus::Pending);
        msg.mark_sent(Some("abc.123".to_string()));
        assert_eq!(msg.status, MessageStatus::Sent);
        assert!(msg.sent_at.is_some());
    }
}
