//! Feed endpoint and management operations.
//!
//! [`App`] wires configuration, storage and the upstream clients together
//! and exposes the operations a front end needs: serving a feed document,
//! checking a source before saving it, feed CRUD and bulk import. Nothing
//! here knows about HTTP routing; [`FeedResponse`] carries the status and
//! body a server would send.

use anyhow::Result;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::fmt;
use thiserror::Error;

use crate::config::Config;
use crate::feed::{parse_import_lines, FeedPipeline};
use crate::storage::{Database, FeedConfig, FeedSettings, User};
use crate::translate::TranslationCache;
use crate::util::{generate_access_token, tokens_match};
use crate::vk::types::UnknownSourceType;
use crate::vk::{
    get_source_info, lookup_source, validate_identifier, IdentifierError, SourceMetadata,
    SourceType, VkClient,
};

pub const RSS_CONTENT_TYPE: &str = "application/rss+xml";

/// Largest `items_count` VK serves in one `wall.get` call.
pub const MAX_ITEMS_COUNT: i64 = 100;

// ============================================================================
// Error Types
// ============================================================================

/// Rejection of an interactive submission, shown to the operator.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error(transparent)]
    UnknownSourceType(#[from] UnknownSourceType),
    #[error(transparent)]
    InvalidIdentifier(#[from] IdentifierError),
    #[error("items count must be between 1 and {max}, got {0}", max = MAX_ITEMS_COUNT)]
    ItemsCountOutOfRange(i64),
}

#[derive(Debug, Error)]
pub enum ManageError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Feed {0} not found")]
    NotFound(i64),
    #[error("Feed {0} belongs to another user")]
    Forbidden(i64),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

// ============================================================================
// Request / Response Types
// ============================================================================

/// What the feed endpoint answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

impl FeedResponse {
    fn ok(body: String) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: RSS_CONTENT_TYPE,
            body,
        }
    }

    fn empty(status: StatusCode) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: String::new(),
        }
    }
}

/// Raw add/edit submission, before validation.
#[derive(Debug, Clone)]
pub struct FeedForm {
    pub title: String,
    pub description: Option<String>,
    pub source_type: String,
    pub source_id: String,
    pub items_count: i64,
    pub include_attachments: bool,
    pub include_comments: bool,
    pub translate_titles: bool,
    pub is_public: bool,
}

impl Default for FeedForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: None,
            source_type: "group".to_string(),
            source_id: String::new(),
            items_count: 20,
            include_attachments: true,
            include_comments: false,
            translate_titles: true,
            is_public: false,
        }
    }
}

impl FeedForm {
    /// Checks the submission and turns it into storable settings.
    ///
    /// The identifier is stored as entered (trimmed) so query flags such as
    /// `own=1` survive until render time.
    pub fn validate(&self) -> Result<FeedSettings, ValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::MissingField("title"));
        }
        if self.source_type.trim().is_empty() {
            return Err(ValidationError::MissingField("source type"));
        }
        let source_type: SourceType = self.source_type.parse()?;
        let source_id = self.source_id.trim();
        if source_id.is_empty() {
            return Err(ValidationError::MissingField("source id"));
        }
        validate_identifier(source_id)?;
        check_items_count(self.items_count)?;

        Ok(FeedSettings {
            title: title.to_string(),
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            source_type,
            source_id: source_id.to_string(),
            items_count: self.items_count,
            include_attachments: self.include_attachments,
            include_comments: self.include_comments,
            translate_titles: self.translate_titles,
            is_public: self.is_public,
        })
    }
}

fn check_items_count(items_count: i64) -> Result<(), ValidationError> {
    if (1..=MAX_ITEMS_COUNT).contains(&items_count) {
        Ok(())
    } else {
        Err(ValidationError::ItemsCountOutOfRange(items_count))
    }
}

/// Settings applied to every feed created by one bulk import.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Title used when a line has no `#title` and VK cannot name the source.
    pub default_title: String,
    pub source_type: SourceType,
    pub items_count: i64,
    pub include_attachments: bool,
    pub include_comments: bool,
    pub translate_titles: bool,
    pub is_public: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            default_title: "VK Feed".to_string(),
            source_type: SourceType::Group,
            items_count: 20,
            include_attachments: true,
            include_comments: false,
            translate_titles: true,
            is_public: false,
        }
    }
}

/// A rejected import line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportLineError {
    pub line_no: usize,
    pub identifier: String,
    pub message: String,
}

impl fmt::Display for ImportLineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}: {}", self.line_no, self.identifier, self.message)
    }
}

/// Aggregate outcome of a bulk import.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub created: Vec<FeedConfig>,
    pub errors: Vec<ImportLineError>,
}

// ============================================================================
// App
// ============================================================================

/// Redirect policy for upstream API calls.
///
/// - Limits redirects to 3 hops maximum
/// - Refuses HTTPS to HTTP downgrades, which would expose the access token
/// - Detects redirect loops
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        let downgraded = url.scheme() == "http"
            && attempt
                .previous()
                .last()
                .is_some_and(|prev| prev.scheme() == "https");
        if downgraded {
            return attempt.error("Refusing HTTPS to HTTP redirect");
        }

        for prev in attempt.previous() {
            if prev.as_str() == url.as_str() {
                return attempt.error("Redirect loop detected");
            }
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url.as_str(),
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

pub fn build_http_client() -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .redirect(create_redirect_policy())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(std::time::Duration::from_secs(30))
        .tcp_keepalive(std::time::Duration::from_secs(60))
        .timeout(std::time::Duration::from_secs(30))
        .user_agent(concat!("vk2rss/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

pub struct App {
    config: Config,
    db: Database,
    vk: VkClient,
    translator: TranslationCache,
}

impl App {
    pub fn new(config: Config, db: Database) -> Result<Self> {
        let http = build_http_client()?;
        Ok(Self::with_http_client(config, db, http))
    }

    /// Builds the app around an existing HTTP client (shared connection pool).
    pub fn with_http_client(config: Config, db: Database, http: reqwest::Client) -> Self {
        let vk = VkClient::new(http.clone(), &config);
        let translator = TranslationCache::new(http, &config.translation);
        Self {
            config,
            db,
            vk,
            translator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn pipeline(&self) -> FeedPipeline<'_> {
        FeedPipeline::new(&self.config, &self.db, &self.vk, &self.translator)
    }

    pub fn feed_url(&self, feed: &FeedConfig) -> String {
        self.config.feed_url(feed.id, &feed.access_token)
    }

    // ------------------------------------------------------------------------
    // Feed endpoint
    // ------------------------------------------------------------------------

    /// Serves `GET /feeds/<id>.rss?token=<token>`.
    ///
    /// Private feeds require the exact access token; a mismatch yields 403
    /// with an empty body. Render failures still answer 200 with a
    /// diagnostic comment document.
    pub async fn serve_feed(&self, feed_id: i64, token: Option<&str>) -> FeedResponse {
        let feed = match self.db.get_feed(feed_id).await {
            Ok(Some(feed)) => feed,
            Ok(None) => return FeedResponse::empty(StatusCode::NOT_FOUND),
            Err(e) => {
                tracing::error!(feed_id = feed_id, error = %e, "Failed to load feed");
                return FeedResponse::empty(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        if !feed.is_public && !tokens_match(&feed.access_token, token) {
            tracing::warn!(feed_id = feed_id, "Rejected feed request with bad token");
            return FeedResponse::empty(StatusCode::FORBIDDEN);
        }

        FeedResponse::ok(self.pipeline().render(&feed).await)
    }

    /// Renders a feed for its owner (or anyone, when public) without a token.
    pub async fn preview_feed(&self, user: &User, feed_id: i64) -> Result<String, ManageError> {
        let feed = self
            .db
            .get_feed(feed_id)
            .await?
            .ok_or(ManageError::NotFound(feed_id))?;
        if feed.user_id != user.id && !feed.is_public {
            return Err(ManageError::Forbidden(feed_id));
        }
        Ok(self.pipeline().render(&feed).await)
    }

    // ------------------------------------------------------------------------
    // Source validation
    // ------------------------------------------------------------------------

    /// Validates a source reference and describes it. Never mutates state.
    pub async fn check_source(
        &self,
        source_type: &str,
        source_id: &str,
    ) -> Result<SourceMetadata, ValidationError> {
        if source_type.trim().is_empty() {
            return Err(ValidationError::MissingField("source type"));
        }
        let source_type: SourceType = source_type.parse()?;
        let source_id = source_id.trim();
        if source_id.is_empty() {
            return Err(ValidationError::MissingField("source id"));
        }
        validate_identifier(source_id)?;
        Ok(get_source_info(&self.vk, source_type, source_id).await)
    }

    // ------------------------------------------------------------------------
    // Management
    // ------------------------------------------------------------------------

    pub async fn add_feed(&self, user: &User, form: &FeedForm) -> Result<FeedConfig, ManageError> {
        let settings = form.validate()?;
        let feed = self
            .db
            .insert_feed(user.id, &settings, &generate_access_token())
            .await?;
        tracing::info!(
            feed_id = feed.id,
            user_id = user.id,
            source_type = %feed.source_type,
            source_id = %feed.source_id,
            "Feed added"
        );
        Ok(feed)
    }

    /// Replaces a feed's settings. The access token is kept.
    pub async fn edit_feed(
        &self,
        user: &User,
        feed_id: i64,
        form: &FeedForm,
    ) -> Result<FeedConfig, ManageError> {
        self.owned_feed(user, feed_id).await?;
        let settings = form.validate()?;
        if !self.db.update_feed(feed_id, &settings).await? {
            return Err(ManageError::NotFound(feed_id));
        }
        tracing::info!(feed_id = feed_id, user_id = user.id, "Feed updated");
        self.db
            .get_feed(feed_id)
            .await?
            .ok_or(ManageError::NotFound(feed_id))
    }

    pub async fn delete_feed(&self, user: &User, feed_id: i64) -> Result<(), ManageError> {
        self.owned_feed(user, feed_id).await?;
        if !self.db.delete_feed(feed_id).await? {
            return Err(ManageError::NotFound(feed_id));
        }
        tracing::info!(feed_id = feed_id, user_id = user.id, "Feed deleted");
        Ok(())
    }

    pub async fn list_feeds(&self, user: &User) -> Result<Vec<FeedConfig>, ManageError> {
        Ok(self.db.get_feeds_for_user(user.id).await?)
    }

    /// The feed, if `user` owns it.
    pub async fn owned_feed(&self, user: &User, feed_id: i64) -> Result<FeedConfig, ManageError> {
        let feed = self
            .db
            .get_feed(feed_id)
            .await?
            .ok_or(ManageError::NotFound(feed_id))?;
        if feed.user_id != user.id {
            tracing::warn!(feed_id = feed_id, user_id = user.id, "Ownership check failed");
            return Err(ManageError::Forbidden(feed_id));
        }
        Ok(feed)
    }

    /// Creates one feed per import line.
    ///
    /// Lines are handled independently: a bad line is reported and the
    /// batch continues, and every created feed is persisted immediately.
    pub async fn import_feeds(
        &self,
        user: &User,
        text: &str,
        options: &ImportOptions,
    ) -> Result<ImportReport, ManageError> {
        check_items_count(options.items_count)?;

        let mut report = ImportReport::default();
        for line in parse_import_lines(text) {
            let reject = |message: String| ImportLineError {
                line_no: line.line_no,
                identifier: line.identifier.clone(),
                message,
            };

            if let Err(e) = validate_identifier(&line.identifier) {
                tracing::warn!(line = line.line_no, error = %e, "Skipping import line");
                report.errors.push(reject(e.to_string()));
                continue;
            }

            let info = lookup_source(&self.vk, options.source_type, &line.identifier).await;
            let metadata = info.metadata;
            let title = line
                .title
                .clone()
                .or_else(|| Some(metadata.title.clone()).filter(|t| !t.trim().is_empty()))
                .unwrap_or_else(|| options.default_title.clone());

            let settings = FeedSettings {
                title,
                description: Some(metadata.description).filter(|d| !d.trim().is_empty()),
                // Screen-name resolution may have corrected the type.
                source_type: info.source.source_type,
                source_id: line.identifier.clone(),
                items_count: options.items_count,
                include_attachments: options.include_attachments,
                include_comments: options.include_comments,
                translate_titles: options.translate_titles,
                is_public: options.is_public,
            };

            match self
                .db
                .insert_feed(user.id, &settings, &generate_access_token())
                .await
            {
                Ok(feed) => report.created.push(feed),
                Err(e) => {
                    tracing::error!(line = line.line_no, error = %e, "Failed to store imported feed");
                    report.errors.push(reject(format!("{:#}", e)));
                }
            }
        }

        tracing::info!(
            user_id = user.id,
            created = report.created.len(),
            failed = report.errors.len(),
            "Import finished"
        );
        Ok(report)
    }
}
