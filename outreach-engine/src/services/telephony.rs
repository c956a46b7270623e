//! Telephony provider client and voice response rendering
//!
//! Initiates outbound calls against a Twilio-style REST API and renders the
//! XML voice documents returned by the webhook endpoints.

use serde::Deserialize;

use outreach_common::config::Settings;
use outreach_common::{Error, Result};

#[derive(Debug, Deserialize)]
struct CallCreatedResponse {
    sid: String,
}

/// Client for outbound call initiation
#[derive(Debug, Clone)]
pub struct TelephonyClient {
    http: reqwest::Client,
    api_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
    default_country_code: String,
}

impl TelephonyClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: settings.telephony_api_url.trim_end_matches('/').to_string(),
            account_sid: settings.telephony_account_sid.clone(),
            auth_token: settings.telephony_auth_token.clone(),
            from_number: settings.telephony_from_number.clone(),
            default_country_code: settings.default_country_code.clone(),
        }
    }

    /// Place an outbound call. `answer_url` and `status_url` are our webhook
    /// endpoints for the call flow and final status. Returns the provider
    /// call SID.
    pub async fn initiate_call(
        &self,
        to: &str,
        answer_url: &str,
        status_url: &str,
    ) -> Result<String> {
        let to = self.normalize_phone(to)?;
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.api_url, self.account_sid
        );

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", to.as_str()),
                ("From", self.from_number.as_str()),
                ("Url", answer_url),
                ("StatusCallback", status_url),
                ("StatusCallbackEvent", "completed"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "telephony provider returned {}: {}",
                status, body
            )));
        }

        let created: CallCreatedResponse = response.json().await?;
        Ok(created.sid)
    }

    /// Normalize a raw phone number to E.164. Bare 10-digit numbers get the
    /// configured default country code.
    pub fn normalize_phone(&self, raw: &str) -> Result<String> {
        normalize_phone(raw, &self.default_country_code)
    }
}

/// E.164 normalization: strip formatting, honor an existing `+` or `00`
/// prefix, and prepend the default country code to bare 10-digit numbers.
pub fn normalize_phone(raw: &str, default_country_code: &str) -> Result<String> {
    let has_plus = raw.trim_start().starts_with('+');
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.is_empty() {
        return Err(Error::InvalidInput(format!("unusable phone number: {raw:?}")));
    }

    let normalized = if has_plus {
        format!("+{}", digits)
    } else if let Some(rest) = digits.strip_prefix("00") {
        format!("+{}", rest)
    } else if digits.len() == 10 {
        format!("{}{}", default_country_code, digits)
    } else {
        format!("+{}", digits)
    };

    if normalized.len() < 8 {
        return Err(Error::InvalidInput(format!("unusable phone number: {raw:?}")));
    }
    Ok(normalized)
}

/// Escape text for inclusion in a voice XML document
pub fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Render a say-and-gather voice document: speak `text`, then collect the
/// caller's speech and POST it to `action_url`.
pub fn twiml_gather(text: &str, voice: &str, gather_language: &str, action_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Gather input="speech" action="{action}" method="POST" language="{lang}" speechTimeout="auto">
    <Say voice="{voice}">{text}</Say>
  </Gather>
  <Say voice="{voice}">{text_repeat}</Say>
  <Redirect method="POST">{action}</Redirect>
</Response>"#,
        action = xml_escape(action_url),
        lang = xml_escape(gather_language),
        voice = xml_escape(voice),
        text = xml_escape(text),
        text_repeat = xml_escape("Are you still there?"),
    )
}

/// Render a final say-and-hangup voice document
pub fn twiml_hangup(text: &str, voice: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Say voice="{voice}">{text}</Say>
  <Hangup/>
</Response>"#,
        voice = xml_escape(voice),
        text = xml_escape(text),
    )
}
