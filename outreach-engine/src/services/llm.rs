//! LLM generation client
//!
//! Talks to an Ollama-compatible generate endpoint. JSON-mode responses are
//! requested with `format: "json"`, and the reply is additionally trimmed to
//! the outermost braces before parsing since models occasionally wrap the
//! object in prose.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use outreach_common::config::Settings;
use outreach_common::{Error, Result};

use super::retry::retry_request;

/// Retries after the initial attempt
const MAX_RETRIES: u32 = 2;

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for the text-generation endpoint
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    generate_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(settings.llm_timeout_secs))
                .build()
                .unwrap_or_default(),
            generate_url: settings.llm_generate_url(),
            model: settings.llm_model.clone(),
        }
    }

    /// Generate free text for a prompt
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        self.request(prompt, false).await
    }

    /// Generate with a per-call timeout override, used by the voice agent
    /// which cannot keep a caller waiting for the default window.
    pub async fn generate_with_timeout(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> Result<String> {
        retry_request("llm_generate", MAX_RETRIES, || async {
            let response = self
                .http
                .post(&self.generate_url)
                .timeout(timeout)
                .json(&json!({
                    "model": self.model,
                    "prompt": prompt,
                    "stream": false,
                }))
                .send()
                .await?;
            Self::parse_response(response).await
        })
        .await
    }

    /// Generate a strict-JSON reply and parse it
    pub async fn generate_json(&self, prompt: &str) -> Result<serde_json::Value> {
        let raw = self.request(prompt, true).await?;
        extract_json_object(&raw)
    }

    async fn request(&self, prompt: &str, json_mode: bool) -> Result<String> {
        retry_request("llm_generate", MAX_RETRIES, || async {
            let mut body = json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
            });
            if json_mode {
                body["format"] = json!("json");
            }
            let response = self.http.post(&self.generate_url).json(&body).send().await?;
            Self::parse_response(response).await
        })
        .await
    }

    async fn parse_response(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        if status.is_server_error() {
            return Err(Error::ProviderUnavailable(format!(
                "LLM endpoint returned {}",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "LLM endpoint returned {}: {}",
                status, body
            )));
        }
        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed.response)
    }
}

/// Trim a model reply to the outermost JSON object and parse it.
///
/// Takes everything between the first `{` and the last `}`, which drops any
/// prose the model wrapped around the object.
pub fn extract_json_object(raw: &str) -> Result<serde_json::Value> {
    let start = raw
        .find('{')
        .ok_or_else(|| Error::Provider("LLM reply contained no JSON object".to_string()))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| Error::Provider("LLM reply contained no JSON object".to_string()))?;
    if end < start {
        return Err(Error::Provider(
            "LLM reply contained no JSON object".to_string(),
        ));
    }
    let value = serde_json::from_str(&raw[start..=end])?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_wrapped_in_prose() {
        let raw = "Sure! Here is the JSON you asked for:\n{\"platform\": \"email\"}\nHope that helps.";
        let value = extract_json_object(raw).unwrap();
        assert_eq!(value["platform"], "email");
    }

    #[test]
    fn extracts_bare_object() {
        let value = extract_json_object("{\"a\": 1}").unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn rejects_replies_without_an_object() {
        assert!(extract_json_object("no json here").is_err());
        assert!(extract_json_object("} backwards {").is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(extract_json_object("{not json}").is_err());
    }
}
