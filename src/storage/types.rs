use sqlx::FromRow;
use thiserror::Error;

use crate::vk::types::SourceType;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("The database is locked by another vk2rss process. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: i64,
}

/// A registered feed: which VK wall to publish and how.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct FeedConfig {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    #[sqlx(try_from = "String")]
    pub source_type: SourceType,
    pub source_id: String,
    pub items_count: i64,
    pub include_attachments: bool,
    /// Stored for completeness; rendering does not fetch comments.
    pub include_comments: bool,
    pub translate_titles: bool,
    pub is_public: bool,
    pub access_token: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_fetched: Option<i64>,
}

/// Fields supplied when registering or editing a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    pub title: String,
    pub description: Option<String>,
    pub source_type: SourceType,
    pub source_id: String,
    pub items_count: i64,
    pub include_attachments: bool,
    pub include_comments: bool,
    pub translate_titles: bool,
    pub is_public: bool,
}

impl FeedSettings {
    /// Settings with the defaults a new feed gets.
    pub fn new(title: &str, source_type: SourceType, source_id: &str) -> Self {
        Self {
            title: title.to_string(),
            description: None,
            source_type,
            source_id: source_id.to_string(),
            items_count: 20,
            include_attachments: true,
            include_comments: false,
            translate_titles: true,
            is_public: false,
        }
    }
}

/// The rendered document stored for a feed.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CachedFeedDocument {
    pub feed_id: i64,
    pub content: String,
    /// UNIX seconds.
    pub cached_at: i64,
}
