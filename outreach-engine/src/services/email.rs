//! Transactional email provider client
//!
//! Speaks a SendGrid-style v3 mail send API. The campaign id travels in
//! custom args and categories so engagement webhooks can be attributed back
//! to the campaign. Sends are retry-wrapped.

use serde_json::json;
use uuid::Uuid;

use outreach_common::config::Settings;
use outreach_common::{Error, Result};

use super::retry::retry_request;

const MAX_RETRIES: u32 = 2;

/// One outbound email
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub body_html: String,
    pub campaign_id: Option<Uuid>,
}

/// Client for the mail send endpoint
#[derive(Debug, Clone)]
pub struct EmailClient {
    http: reqwest::Client,
    send_url: String,
    api_key: String,
    from_email: String,
    from_name: String,
}

impl EmailClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            send_url: format!(
                "{}/v3/mail/send",
                settings.email_api_url.trim_end_matches('/')
            ),
            api_key: settings.email_api_key.clone(),
            from_email: settings.email_from.clone(),
            from_name: settings.sender_name.clone(),
        }
    }

    /// Send one email. Returns the provider message id when the provider
    /// reports one (202 Accepted with an X-Message-Id header).
    pub async fn send(&self, message: &EmailMessage) -> Result<Option<String>> {
        let payload = self.build_payload(message);

        retry_request("email_send", MAX_RETRIES, || async {
            let response = self
                .http
                .post(&self.send_url)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send()
                .await?;

            let status = response.status();
            if status.is_server_error() {
                return Err(Error::ProviderUnavailable(format!(
                    "email provider returned {}",
                    status
                )));
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Provider(format!(
                    "email provider returned {}: {}",
                    status, body
                )));
            }

            let message_id = response
                .headers()
                .get("X-Message-Id")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            Ok(message_id)
        })
        .await
    }

    fn build_payload(&self, message: &EmailMessage) -> serde_json::Value {
        let mut to = json!({ "email": message.to });
        if let Some(name) = &message.to_name {
            to["name"] = json!(name);
        }

        let mut payload = json!({
            "personalizations": [{ "to": [to] }],
            "from": { "email": self.from_email, "name": self.from_name },
            "subject": message.subject,
            "content": [{ "type": "text/html", "value": message.body_html }],
            "headers": {
                "List-Unsubscribe": format!("<mailto:unsubscribe@{}>", from_domain(&self.from_email)),
            },
        });

        if let Some(campaign_id) = message.campaign_id {
            let id = campaign_id.to_string();
            payload["custom_args"] = json!({ "campaign_id": id });
            payload["categories"] = json!([id]);
        }

        payload
    }
}

fn from_domain(address: &str) -> &str {
    address.rsplit('@').next().unwrap_or("example.com")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> EmailClient {
        let mut settings = Settings::from_env();
        settings.email_api_url = "https://mail.example".to_string();
        settings.email_from = "team@acme.io".to_string();
        settings.sender_name = "Acme Team".to_string();
        EmailClient::new(&settings)
    }

    #[test]
    fn payload_carries_campaign_attribution() {
        let campaign_id = Uuid::new_v4();
        let message = EmailMessage {
            to: "asha@example.com".to_string(),
            to_name: Some("Asha".to_string()),
            subject: "Hello".to_string(),
            body_html: "<p>Hi</p>".to_string(),
            campaign_id: Some(campaign_id),
        };

        let payload = client().build_payload(&message);
        assert_eq!(payload["custom_args"]["campaign_id"], campaign_id.to_string());
        assert_eq!(payload["categories"][0], campaign_id.to_string());
        assert_eq!(payload["from"]["name"], "Acme Team");
        assert_eq!(
            payload["personalizations"][0]["to"][0]["email"],
            "asha@example.com"
        );
    }

    #[test]
    fn payload_without_campaign_has_no_attribution() {
        let message = EmailMessage {
            to: "a@b.com".to_string(),
            to_name: None,
            subject: "s".to_string(),
            body_html: "b".to_string(),
            campaign_id: None,
        };
        let payload = client().build_payload(&message);
        assert!(payload.get("custom_args").is_none());
        assert_eq!(
            payload["headers"]["List-Unsubscribe"],
            "<mailto:unsubscribe@acme.io>"
        );
    }
}
