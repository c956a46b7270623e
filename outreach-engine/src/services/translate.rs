//! Translation API client

use serde::Deserialize;
use serde_json::json;

use outreach_common::config::Settings;
use outreach_common::{Error, Result};

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// Client for a Google-Translate-style v2 endpoint
#[derive(Debug, Clone)]
pub struct TranslateClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl TranslateClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: settings.translate_api_url.clone(),
            api_key: settings.translate_api_key.clone(),
        }
    }

    /// Translate English text into `target` (a bare ISO 639-1 code)
    pub async fn translate(&self, text: &str, target: &str) -> Result<String> {
        let response = self
            .http
            .post(&self.api_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "q": text,
                "source": "en",
                "target": target,
                "format": "text",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "translation API returned {}: {}",
                status, body
            )));
        }

        let parsed: TranslateResponse = response.json().await?;
        parsed
            .data
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| Error::Provider("translation API returned no translations".to_string()))
    }
}
