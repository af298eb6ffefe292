//! Feed rendering: cache check, source lookup, wall fetch, document build
//! and cache store for one request.
//!
//! Rendering never fails outward. Upstream errors become a one-line comment
//! document; storage errors are logged and rendering carries on without the
//! cache.

use chrono::{DateTime, Utc};

use super::rss::{error_document, write_rss, Channel, Item};
use crate::config::Config;
use crate::content::{format_post, post_url};
use crate::storage::{Database, FeedConfig};
use crate::translate::TranslationCache;
use crate::util::{first_line, truncate_chars};
use crate::vk::client::MAX_WALL_COUNT;
use crate::vk::{lookup_source, wall_filter, SourceMetadata, VkClient, WallPost};

/// Longest entry title taken from a post's first line, in characters.
pub const MAX_ENTRY_TITLE_CHARS: usize = 100;

/// How a render request ended. Every variant carries a servable document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Stored document younger than the TTL, returned verbatim.
    Cached(String),
    /// Freshly built document.
    Fresh(String),
    /// Upstream failure; the document is a diagnostic comment.
    Failed(String),
}

impl RenderOutcome {
    pub fn document(&self) -> &str {
        match self {
            RenderOutcome::Cached(doc) | RenderOutcome::Fresh(doc) | RenderOutcome::Failed(doc) => {
                doc
            }
        }
    }

    pub fn into_document(self) -> String {
        match self {
            RenderOutcome::Cached(doc) | RenderOutcome::Fresh(doc) | RenderOutcome::Failed(doc) => {
                doc
            }
        }
    }
}

/// Borrowed view over the collaborators a render needs.
pub struct FeedPipeline<'a> {
    config: &'a Config,
    db: &'a Database,
    vk: &'a VkClient,
    translator: &'a TranslationCache,
}

impl<'a> FeedPipeline<'a> {
    pub fn new(
        config: &'a Config,
        db: &'a Database,
        vk: &'a VkClient,
        translator: &'a TranslationCache,
    ) -> Self {
        Self {
            config,
            db,
            vk,
            translator,
        }
    }

    pub async fn render(&self, feed: &FeedConfig) -> String {
        self.render_at(feed, Utc::now()).await.into_document()
    }

    /// Renders `feed` as of `now`.
    pub async fn render_at(&self, feed: &FeedConfig, now: DateTime<Utc>) -> RenderOutcome {
        if let Some(doc) = self.cached_document(feed.id, now).await {
            return RenderOutcome::Cached(doc);
        }

        tracing::debug!(
            feed_id = feed.id,
            source_type = %feed.source_type,
            source_id = %feed.source_id,
            "Rendering feed"
        );

        let info = lookup_source(self.vk, feed.source_type, &feed.source_id).await;
        let owner = info.source.wall_owner();
        let count = feed.items_count.clamp(1, MAX_WALL_COUNT as i64) as u32;
        let filter = wall_filter(&feed.source_id);

        let wall = match self.vk.fetch_wall(&owner, count, 0, filter).await {
            Ok(wall) => wall,
            Err(e) => {
                tracing::error!(feed_id = feed.id, owner = %owner, error = %e, "Wall fetch failed");
                return RenderOutcome::Failed(error_document(&e.to_string()));
            }
        };

        let channel = self
            .build_channel(feed, &info.metadata, &owner, &wall.items, now)
            .await;
        let doc = match write_rss(&channel) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!(feed_id = feed.id, error = %e, "Failed to serialize feed");
                return RenderOutcome::Failed(error_document(&e.to_string()));
            }
        };

        if let Err(e) = self
            .db
            .complete_feed_render(feed.id, &doc, now.timestamp())
            .await
        {
            tracing::warn!(feed_id = feed.id, error = %e, "Failed to cache rendered feed");
        }

        tracing::info!(feed_id = feed.id, items = wall.items.len(), "Rendered feed");
        RenderOutcome::Fresh(doc)
    }

    async fn cached_document(&self, feed_id: i64, now: DateTime<Utc>) -> Option<String> {
        let cached = match self.db.get_cached_feed(feed_id).await {
            Ok(cached) => cached?,
            Err(e) => {
                tracing::warn!(feed_id = feed_id, error = %e, "Cache lookup failed, rendering fresh");
                return None;
            }
        };
        let age = now.timestamp().saturating_sub(cached.cached_at);
        if age < self.config.feed_cache_ttl_secs as i64 {
            tracing::debug!(feed_id = feed_id, age_secs = age, "Serving cached feed");
            Some(cached.content)
        } else {
            None
        }
    }

    fn translating(&self, feed: &FeedConfig) -> bool {
        self.config.translation.enabled && feed.translate_titles
    }

    /// Translated text when translation is on and changed it.
    async fn maybe_translate(&self, feed: &FeedConfig, text: &str) -> String {
        if !self.translating(feed) {
            return text.to_string();
        }
        let lang = &self.config.translation;
        let translated = self
            .translator
            .translate(text, &lang.source_lang, &lang.target_lang)
            .await;
        if translated.is_empty() {
            text.to_string()
        } else {
            translated
        }
    }

    async fn build_channel(
        &self,
        feed: &FeedConfig,
        metadata: &SourceMetadata,
        owner: &str,
        posts: &[WallPost],
        now: DateTime<Utc>,
    ) -> Channel {
        let base_title = if feed.title.trim().is_empty() {
            metadata.title.as_str()
        } else {
            feed.title.as_str()
        };
        let description = feed
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(&metadata.description);

        let mut items = Vec::with_capacity(posts.len());
        for post in posts {
            items.push(self.build_item(feed, owner, post).await);
        }

        Channel {
            title: self.maybe_translate(feed, base_title).await,
            link: metadata.link.clone(),
            description: description.to_string(),
            self_url: self.config.feed_url(feed.id, &feed.access_token),
            language: self
                .translating(feed)
                .then(|| self.config.translation.target_lang.clone()),
            last_build_date: now,
            image: metadata.image.clone(),
            items,
        }
    }

    async fn build_item(&self, feed: &FeedConfig, owner: &str, post: &WallPost) -> Item {
        let pub_date = DateTime::<Utc>::from_timestamp(post.date, 0).unwrap_or_default();

        let line = first_line(&post.text);
        let title = if line.trim().is_empty() {
            format!("Post from {}", pub_date.format("%Y-%m-%d %H:%M:%S"))
        } else {
            truncate_chars(line, MAX_ENTRY_TITLE_CHARS).into_owned()
        };

        let owner_id = post.owner_id.or_else(|| owner.parse().ok()).unwrap_or(0);
        let post_id = post.id.unwrap_or(0);

        Item {
            title: self.maybe_translate(feed, &title).await,
            link: post_url(post),
            description: format_post(post, feed.include_attachments),
            guid: format!("vk-post-{}_{}", owner_id, post_id),
            pub_date,
            author: entry_author(post, owner_id),
        }
    }
}

fn entry_author(post: &WallPost, owner_id: i64) -> String {
    match post.signer_id.filter(|&id| id != 0) {
        Some(signer) => format!("User ID: {}", signer),
        None if owner_id < 0 => format!("Group ID: {}", owner_id.abs()),
        None => format!("User ID: {}", owner_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_author() {
        let mut post = WallPost::default();
        assert_eq!(entry_author(&post, -42), "Group ID: 42");
        assert_eq!(entry_author(&post, 7), "User ID: 7");

        post.signer_id = Some(99);
        assert_eq!(entry_author(&post, -42), "User ID: 99");

        post.signer_id = Some(0);
        assert_eq!(entry_author(&post, -42), "Group ID: 42");
    }

    #[test]
    fn test_outcome_document() {
        let outcome = RenderOutcome::Failed("<!-- x -->".to_string());
        assert_eq!(outcome.document(), "<!-- x -->");
        assert_eq!(outcome.into_document(), "<!-- x -->");
    }
}
