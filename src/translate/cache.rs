use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;

use super::mymemory::MyMemoryClient;
use crate::config::TranslationConfig;
use crate::util::truncate_chars;

/// Longest input sent to the translator, in characters.
pub const MAX_TRANSLATION_CHARS: usize = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    source_lang: String,
    target_lang: String,
    text: String,
}

/// Memoizing, never-failing front of the remote translator.
///
/// Entries are keyed by `(source_lang, target_lang, text)` and evicted
/// least-recently-used once `cache_capacity` is reached. Failed
/// translations are never stored, so a later call retries the service.
pub struct TranslationCache {
    client: MyMemoryClient,
    entries: Mutex<LruCache<CacheKey, String>>,
}

impl TranslationCache {
    pub fn new(http: reqwest::Client, config: &TranslationConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            client: MyMemoryClient::new(http, &config.base_url),
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Translates `text`, falling back to the (possibly truncated) input on
    /// any failure.
    pub async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let text = truncate_chars(text, MAX_TRANSLATION_CHARS);
        let key = CacheKey {
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            text: text.to_string(),
        };

        if let Some(hit) = self.entries.lock().await.get(&key) {
            tracing::debug!(chars = text.chars().count(), "Translation cache hit");
            return hit.clone();
        }

        match self.client.translate(&text, source_lang, target_lang).await {
            Ok(translated) => {
                if translated != *text {
                    tracing::info!(
                        source_lang = %source_lang,
                        target_lang = %target_lang,
                        "Translated text"
                    );
                    self.entries.lock().await.put(key, translated.clone());
                }
                translated
            }
            Err(e) => {
                tracing::warn!(error = %e, "Translation failed, keeping original text");
                text.into_owned()
            }
        }
    }

    /// Number of memoized translations.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
