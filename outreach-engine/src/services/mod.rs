//! Service layer: external provider clients and the dispatch/voice flows

pub mod dispatch;
pub mod email;
pub mod language;
pub mod llm;
pub mod localization;
pub mod retry;
pub mod safety;
pub mod telephony;
pub mod translate;
pub mod voice_agent;
