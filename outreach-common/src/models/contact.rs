//! Contact and ICP scoring entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A prospect record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    /// ISO language code, used for localization of outbound content
    pub language: String,
    pub created_at: DateTime<Utc>,
    /// Joined from icp_results when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buying_probability_score: Option<f64>,
}

impl Contact {
    pub fn new(name: &str, email: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            phone: None,
            role: None,
            company: None,
            location: None,
            category: None,
            language: "en".to_string(),
            created_at: Utc::now(),
            buying_probability_score: None,
        }
    }

    /// First name for template substitution; falls back to the full name.
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

/// Ideal Customer Profile score attached to a contact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcpResult {
    pub id: Uuid,
    pub contact_id: Uuid,
    /// 0-100 likelihood of conversion
    pub buying_probability_score: f64,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl IcpResult {
    pub fn new(contact_id: Uuid, score: f64, label: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            contact_id,
            buying_probability_score: score.clamp(0.0, 100.0),
            label,
            created_at: Utc::now(),
        }
    }
}
