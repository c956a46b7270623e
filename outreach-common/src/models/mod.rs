//! Shared data model types
//!
//! Entities are persisted with UUID ids and RFC 3339 timestamps stored as
//! TEXT, with JSON payloads serialized to TEXT columns.

pub mod campaign;
pub mod contact;
pub mod messaging;
pub mod pipeline;
pub mod voice;

pub use campaign::{normalize_platform, Campaign, GeneratedContent};
pub use contact::{Contact, IcpResult};
pub use messaging::{
    ConversionEvent, ConversionKind, EmailTrackingEvent, EngagementHistory, EngagementType,
    MessageStatus, OutboundMessage,
};
pub use pipeline::{CampaignLog, Channel, PipelineRun, PipelineState};
pub use voice::{CallStatus, CapturePhase, ConversationTurn, Speaker, VoiceCall, VoiceSession};
