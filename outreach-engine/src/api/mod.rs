//! HTTP API surface

pub mod analytics;
pub mod approval;
pub mod campaigns;
pub mod contacts;
pub mod events;
pub mod health;
pub mod insights;
pub mod tracking;
pub mod voice;
