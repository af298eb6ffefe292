use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::util::{read_limited_bytes, ReadLimitError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RESPONSE_SIZE: usize = 1024 * 1024; // 1MB

/// Substrings the service puts in `translatedText` instead of a translation.
const FAILURE_MARKERS: [&str; 3] = ["MYMEMORY WARNING", "[PYFAILURE]", "QUERY LENGTH LIMIT"];

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Translation request timed out after {}s", REQUEST_TIMEOUT.as_secs())]
    Timeout,
    #[error("Translation request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Translation service returned HTTP status {0}")]
    HttpStatus(u16),
    #[error("Translation response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Unexpected translation response: {0}")]
    Decode(String),
    #[error("Translation rejected: {0}")]
    Rejected(String),
    #[error("Invalid translation service URL: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyMemoryResponse {
    response_data: Option<ResponseData>,
    /// Integer on success, sometimes a string on errors.
    response_status: Option<serde_json::Value>,
    response_details: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseData {
    #[serde(default)]
    translated_text: String,
}

/// Client for the MyMemory `GET /get?q=..&langpair=src|dst` endpoint.
#[derive(Debug, Clone)]
pub struct MyMemoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl MyMemoryClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Translates `text` and returns the service's answer.
    ///
    /// Empty answers and answers carrying one of the service's failure
    /// markers are reported as [`TranslationError::Rejected`].
    pub async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, TranslationError> {
        let url = Url::parse_with_params(
            &format!("{}/get", self.base_url),
            &[
                ("q", text),
                ("langpair", &format!("{}|{}", source_lang, target_lang)),
            ],
        )
        .map_err(|e| TranslationError::InvalidUrl(e.to_string()))?;

        let response = tokio::time::timeout(REQUEST_TIMEOUT, self.http.get(url).send())
            .await
            .map_err(|_| TranslationError::Timeout)?
            .map_err(|e| TranslationError::Network(e.without_url()))?;

        if !response.status().is_success() {
            return Err(TranslationError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
        let parsed: MyMemoryResponse =
            serde_json::from_slice(&bytes).map_err(|e| TranslationError::Decode(e.to_string()))?;

        if let Some(status) = parsed.response_status.as_ref().and_then(status_code) {
            if status != 200 {
                let details = parsed
                    .response_details
                    .as_ref()
                    .and_then(|d| d.as_str())
                    .unwrap_or("")
                    .to_string();
                return Err(TranslationError::Rejected(format!(
                    "status {}: {}",
                    status, details
                )));
            }
        }

        let translated = parsed
            .response_data
            .map(|d| d.translated_text)
            .unwrap_or_default();

        if translated.trim().is_empty() {
            return Err(TranslationError::Rejected("empty translation".to_string()));
        }
        if let Some(marker) = FAILURE_MARKERS.iter().find(|m| translated.contains(*m)) {
            return Err(TranslationError::Rejected(marker.to_string()));
        }

        Ok(translated)
    }
}

fn status_code(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl From<ReadLimitError> for TranslationError {
    fn from(e: ReadLimitError) -> Self {
        match e {
            ReadLimitError::TooLarge(limit) => TranslationError::ResponseTooLarge(limit),
            ReadLimitError::Transport(e) => TranslationError::Network(e),
        }
    }
}
