//! Configuration file parser for ~/.config/vk2rss/config.toml.
//!
//! The config file is optional. A missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
//!
//! A handful of environment variables override the file so deployments can
//! keep the VK credential out of it: `VK_API_TOKEN`, `SITE_URL`,
//! `FEED_CACHE_TIMEOUT` and `DATABASE_URL`.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// The value is built once in `main` and handed to each component's
/// constructor; nothing reads it ambiently.
///
/// SEC-015: Custom Debug impl masks `vk_api_token` to prevent secret leakage
/// in logs, error messages, and debug output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// VK service/user access token attached to every API call.
    pub vk_api_token: Option<String>,

    /// VK API version sent as the `v` parameter.
    pub vk_api_version: String,

    /// Base URL for VK API methods (overridable for tests).
    pub vk_api_base_url: String,

    /// Public base URL of this deployment, used to build canonical feed URLs.
    pub site_url: String,

    /// How long a rendered feed document is served from cache, in seconds.
    pub feed_cache_ttl_secs: u64,

    /// SQLite database path. `None` means `<config dir>/vk2rss.db`.
    pub database_path: Option<PathBuf>,

    /// Title translation settings.
    pub translation: TranslationConfig,
}

/// `[translation]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Master switch. Feeds additionally carry their own `translate_titles` flag.
    pub enabled: bool,
    pub source_lang: String,
    pub target_lang: String,
    /// Base URL of the MyMemory-compatible translation service.
    pub base_url: String,
    /// Maximum number of memoized translations kept in process.
    pub cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vk_api_token: None,
            vk_api_version: "5.131".to_string(),
            vk_api_base_url: "https://api.vk.com/method".to_string(),
            site_url: "http://localhost:5000".to_string(),
            feed_cache_ttl_secs: 300,
            database_path: None,
            translation: TranslationConfig::default(),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source_lang: "ru".to_string(),
            target_lang: "es".to_string(),
            base_url: "https://api.mymemory.translated.net".to_string(),
            cache_capacity: 1024,
        }
    }
}

/// SEC-015: Mask vk_api_token in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "vk_api_token",
                &self.vk_api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("vk_api_version", &self.vk_api_version)
            .field("vk_api_base_url", &self.vk_api_base_url)
            .field("site_url", &self.site_url)
            .field("feed_cache_ttl_secs", &self.feed_cache_ttl_secs)
            .field("database_path", &self.database_path)
            .field("translation", &self.translation)
            .finish()
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "vk_api_token",
                "vk_api_version",
                "vk_api_base_url",
                "site_url",
                "feed_cache_ttl_secs",
                "database_path",
                "translation",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            site_url = %config.site_url,
            ttl_secs = config.feed_cache_ttl_secs,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Apply environment overrides on top of file values.
    ///
    /// `lookup` is injected so tests do not have to mutate the process
    /// environment; `main` passes `std::env::var(..).ok()`.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("VK_API_TOKEN").filter(|t| !t.is_empty()) {
            self.vk_api_token = Some(token);
        }
        if let Some(site_url) = lookup("SITE_URL").filter(|s| !s.is_empty()) {
            self.site_url = site_url;
        }
        if let Some(ttl) = lookup("FEED_CACHE_TIMEOUT") {
            self.feed_cache_ttl_secs = ttl.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "FEED_CACHE_TIMEOUT",
                value: ttl.clone(),
            })?;
        }
        if let Some(db) = lookup("DATABASE_URL").filter(|s| !s.is_empty()) {
            let path = db.strip_prefix("sqlite:///").unwrap_or(&db);
            self.database_path = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    /// Cache validity window for rendered feed documents.
    pub fn feed_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.feed_cache_ttl_secs)
    }

    /// Canonical public URL of a feed document, including its access token.
    pub fn feed_url(&self, feed_id: i64, access_token: &str) -> String {
        format!(
            "{}/feeds/{}.rss?token={}",
            self.site_url.trim_end_matches('/'),
            feed_id,
            access_token
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
