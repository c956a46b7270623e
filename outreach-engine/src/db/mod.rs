//! Database operations for the engine
//!
//! All ids are stored as hyphenated UUID TEXT and timestamps as RFC 3339
//! TEXT, so every module binds strings and parses on the way out.

pub mod analytics;
pub mod campaigns;
pub mod contacts;
pub mod engagement;
pub mod logs;
pub mod messages;
pub mod runs;
pub mod tracking;
pub mod voice_calls;

use chrono::{DateTime, Utc};
use outreach_common::{Error, Result};
use uuid::Uuid;

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Internal(format!("invalid uuid in database: {}", e)))
}

pub(crate) fn parse_opt_uuid(s: Option<&str>) -> Result<Option<Uuid>> {
    s.map(parse_uuid).transpose()
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("invalid timestamp in database: {}", e)))
}

pub(crate) fn parse_opt_ts(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    s.map(parse_ts).transpose()
}

pub(crate) fn parse_opt_json(s: Option<&str>) -> Result<Option<serde_json::Value>> {
    s.map(|raw| serde_json::from_str(raw).map_err(Error::from))
        .transpose()
}
