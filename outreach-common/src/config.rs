//! Configuration loading
//!
//! Provider endpoints and credentials are sourced from environment variables
//! with local-development defaults, so the service starts without any
//! configuration in place. Bind address and database path come from the CLI
//! (see the engine binary).

/// Runtime settings for external integrations
#[derive(Debug, Clone)]
pub struct Settings {
    /// LLM endpoint base URL (generate endpoint appended if missing)
    pub llm_host: String,
    /// Model name passed to the LLM endpoint
    pub llm_model: String,
    /// Per-request timeout for LLM generation, seconds
    pub llm_timeout_secs: u64,

    /// Transactional email provider API base URL
    pub email_api_url: String,
    /// Email provider API key
    pub email_api_key: String,
    /// From address for outbound email
    pub email_from: String,
    /// Human sender name substituted into templates
    pub sender_name: String,

    /// Telephony provider API base URL
    pub telephony_api_url: String,
    /// Telephony account identifier
    pub telephony_account_sid: String,
    /// Telephony auth token
    pub telephony_auth_token: String,
    /// Caller number for outbound voice calls
    pub telephony_from_number: String,

    /// Translation API endpoint
    pub translate_api_url: String,
    /// Translation API key
    pub translate_api_key: String,

    /// Publicly reachable base URL for provider callbacks
    pub public_base_url: String,
    /// Country code prepended to bare 10-digit phone numbers
    pub default_country_code: String,
}

impl Settings {
    /// Load settings from environment variables, falling back to
    /// local-development defaults.
    pub fn from_env() -> Self {
        Self {
            llm_host: env_or("OUTREACH_LLM_HOST", "http://localhost:11434"),
            llm_model: env_or("OUTREACH_LLM_MODEL", "llama3"),
            llm_timeout_secs: env_or("OUTREACH_LLM_TIMEOUT_SECS", "60")
                .parse()
                .unwrap_or(60),
            email_api_url: env_or("OUTREACH_EMAIL_API_URL", "https://api.sendgrid.com"),
            email_api_key: env_or("OUTREACH_EMAIL_API_KEY", ""),
            email_from: env_or("OUTREACH_EMAIL_FROM", "noreply@example.com"),
            sender_name: env_or("OUTREACH_SENDER_NAME", "Outreach Team"),
            telephony_api_url: env_or("OUTREACH_TELEPHONY_API_URL", "https://api.twilio.com"),
            telephony_account_sid: env_or("OUTREACH_TELEPHONY_ACCOUNT_SID", ""),
            telephony_auth_token: env_or("OUTREACH_TELEPHONY_AUTH_TOKEN", ""),
            telephony_from_number: env_or("OUTREACH_TELEPHONY_FROM_NUMBER", ""),
            translate_api_url: env_or(
                "OUTREACH_TRANSLATE_API_URL",
                "https://translation.googleapis.com/language/translate/v2",
            ),
            translate_api_key: env_or("OUTREACH_TRANSLATE_API_KEY", ""),
            public_base_url: env_or("OUTREACH_PUBLIC_BASE_URL", "http://localhost:8000"),
            default_country_code: env_or("OUTREACH_DEFAULT_COUNTRY_CODE", "+91"),
        }
    }

    /// Full URL of the LLM generate endpoint.
    ///
    /// Accepts either a bare host (`http://localhost:11434`) or a URL that
    /// already includes the generate path.
    pub fn llm_generate_url(&self) -> String {
        let host = self.llm_host.trim_end_matches('/');
        if host.ends_with("/api/generate") {
            host.to_string()
        } else {
            format!("{}/api/generate", host)
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
