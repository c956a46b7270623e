//! Localization cache over the translation client
//!
//! Translations are cached per language keyed by a hash of the source text,
//! with a 24 hour TTL. English is a passthrough, and any translation failure
//! falls back to the English source so dispatch never blocks on the
//! translation API.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use outreach_common::config::Settings;
use outreach_common::models::Contact;

use super::translate::TranslateClient;

const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct CacheEntry {
    text: String,
    cached_at: Instant,
}

/// Translation cache + client
pub struct Localizer {
    client: TranslateClient,
    /// language -> (content hash -> translation)
    cache: RwLock<HashMap<String, HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

impl Localizer {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: TranslateClient::new(settings),
            cache: RwLock::new(HashMap::new()),
            ttl: CACHE_TTL,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_ttl(settings: &Settings, ttl: Duration) -> Self {
        Self {
            client: TranslateClient::new(settings),
            cache: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Localize English text into the contact's language. English (or an
    /// unspecified language) passes through; failures fall back to English.
    pub async fn localize(&self, text: &str, language: &str) -> String {
        let language = base_language(language);
        if language.is_empty() || language == "en" {
            return text.to_string();
        }

        let key = content_key(text);

        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(language).and_then(|m| m.get(&key)) {
                if entry.cached_at.elapsed() < self.ttl {
                    return entry.text.clone();
                }
            }
        }

        match self.client.translate(text, language).await {
            Ok(translated) => {
                let mut cache = self.cache.write().await;
                cache.entry(language.to_string()).or_default().insert(
                    key,
                    CacheEntry {
                        text: translated.clone(),
                        cached_at: Instant::now(),
                    },
                );
                translated
            }
            Err(err) => {
                tracing::warn!(
                    language,
                    error = %err,
                    "Translation failed, falling back to English"
                );
                text.to_string()
            }
        }
    }

    /// Group contacts by language for batch localization
    pub fn group_by_language(contacts: &[Contact]) -> HashMap<String, Vec<&Contact>> {
        let mut groups: HashMap<String, Vec<&Contact>> = HashMap::new();
        for contact in contacts {
            groups
                .entry(base_language(&contact.language).to_string())
                .or_default()
                .push(contact);
        }
        groups
    }

    /// Pre-warm one template text for every language in the group map.
    /// Returns language -> localized text.
    pub async fn localize_for_groups(
        &self,
        text: &str,
        languages: impl IntoIterator<Item = &str>,
    ) -> HashMap<String, String> {
        let mut localized = HashMap::new();
        for language in languages {
            let language = base_language(language);
            if localized.contains_key(language) {
                continue;
            }
            localized.insert(language.to_string(), self.localize(text, language).await);
        }
        localized
    }

    #[cfg(test)]
    pub(crate) async fn seed_cache(&self, language: &str, source: &str, translated: &str) {
        let mut cache = self.cache.write().await;
        cache.entry(language.to_string()).or_default().insert(
            content_key(source),
            CacheEntry {
                text: translated.to_string(),
                cached_at: Instant::now(),
            },
        );
    }
}

/// Reduce a locale ("hi-IN") to its base language ("hi")
pub fn base_language(language: &str) -> &str {
    language.split(['-', '_']).next().unwrap_or(language).trim()
}

fn content_key(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("{:x}", digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn localizer() -> Localizer {
        Localizer::new(&Settings::from_env())
    }

    #[tokio::test]
    async fn english_passes_through_without_translation() {
        let text = "Hello there";
        assert_eq!(localizer().localize(text, "en").await, text);
        assert_eq!(localizer().localize(text, "en-US").await, text);
        assert_eq!(localizer().localize(text, "").await, text);
    }

    #[tokio::test]
    async fn cache_hit_skips_the_api() {
        let localizer = localizer();
        localizer.seed_cache("hi", "Hello", "नमस्ते").await;
        // No network call happens on a warm cache
        assert_eq!(localizer.localize("Hello", "hi-IN").await, "नमस्ते");
    }

    #[tokio::test]
    async fn expired_entries_fall_back_to_english_when_api_is_down() {
        let mut settings = Settings::from_env();
        // Unreachable endpoint: the refreshed lookup must fail fast
        settings.translate_api_url = "http://127.0.0.1:9".to_string();
        let localizer = Localizer::with_ttl(&settings, Duration::from_secs(0));
        localizer.seed_cache("hi", "Hello", "नमस्ते").await;
        // TTL of zero expires the entry immediately; the API is unreachable
        // in tests, so the English source comes back
        assert_eq!(localizer.localize("Hello", "hi").await, "Hello");
    }

    #[test]
    fn language_groups_collapse_locales() {
        let mut a = Contact::new("A", "a@example.com");
        a.language = "hi-IN".to_string();
        let mut b = Contact::new("B", "b@example.com");
        b.language = "hi".to_string();
        let c = Contact::new("C", "c@example.com");

        let contacts = vec![a, b, c];
        let groups = Localizer::group_by_language(&contacts);
        assert_eq!(groups["hi"].len(), 2);
        assert_eq!(groups["en"].len(), 1);
    }

    #[test]
    fn base_language_trims_locale() {
        assert_eq!(base_language("hi-IN"), "hi");
        assert_eq!(base_language("en_US"), "en");
        assert_eq!(base_language("ta"), "ta");
    }
}
