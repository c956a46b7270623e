//! # Outreach Common Library
//!
//! Shared code for the outreach campaign engine:
//! - Database models and schema initialization
//! - Event types (CampaignEvent enum) and the in-process event bus
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
