use anyhow::{Context, Result};
use chrono::Utc;

use super::schema::Database;
use super::types::{FeedConfig, FeedSettings};

const FEED_COLUMNS: &str = "id, user_id, title, description, source_type, source_id, items_count, \
     include_attachments, include_comments, translate_titles, is_public, access_token, \
     created_at, updated_at, last_fetched";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed for `user_id`. Returns the stored row.
    pub async fn insert_feed(
        &self,
        user_id: i64,
        settings: &FeedSettings,
        access_token: &str,
    ) -> Result<FeedConfig> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO feeds (
                user_id, title, description, source_type, source_id, items_count,
                include_attachments, include_comments, translate_titles, is_public,
                access_token, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(user_id)
        .bind(&settings.title)
        .bind(&settings.description)
        .bind(settings.source_type.as_str())
        .bind(&settings.source_id)
        .bind(settings.items_count)
        .bind(settings.include_attachments)
        .bind(settings.include_comments)
        .bind(settings.translate_titles)
        .bind(settings.is_public)
        .bind(access_token)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to insert feed")?;

        let id = result.last_insert_rowid();
        self.get_feed(id)
            .await?
            .with_context(|| format!("Feed {} vanished after insert", id))
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<FeedConfig>> {
        let feed = sqlx::query_as::<_, FeedConfig>(&format!(
            "SELECT {} FROM feeds WHERE id = ?",
            FEED_COLUMNS
        ))
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// All feeds owned by a user, newest first.
    pub async fn get_feeds_for_user(&self, user_id: i64) -> Result<Vec<FeedConfig>> {
        let feeds = sqlx::query_as::<_, FeedConfig>(&format!(
            "SELECT {} FROM feeds WHERE user_id = ? ORDER BY created_at DESC, id DESC",
            FEED_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    /// Replace a feed's editable settings.
    ///
    /// The cached document is dropped in the same transaction so the next
    /// request renders with the new settings. Returns `false` if the feed
    /// does not exist.
    pub async fn update_feed(&self, feed_id: i64, settings: &FeedSettings) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE feeds SET
                title = ?, description = ?, source_type = ?, source_id = ?, items_count = ?,
                include_attachments = ?, include_comments = ?, translate_titles = ?,
                is_public = ?, updated_at = ?
            WHERE id = ?
        "#,
        )
        .bind(&settings.title)
        .bind(&settings.description)
        .bind(settings.source_type.as_str())
        .bind(&settings.source_id)
        .bind(settings.items_count)
        .bind(settings.include_attachments)
        .bind(settings.include_comments)
        .bind(settings.translate_titles)
        .bind(settings.is_public)
        .bind(Utc::now().timestamp())
        .bind(feed_id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to update feed {}", feed_id))?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM feed_cache WHERE feed_id = ?")
            .bind(feed_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Delete a feed. Its cache row goes with it (ON DELETE CASCADE).
    pub async fn delete_feed(&self, feed_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(feed_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete feed {}", feed_id))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, FeedSettings};
    use crate::vk::SourceType;

    async fn test_db() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.ensure_user("alice").await.unwrap();
        (db, user.id)
    }

    #[tokio::test]
    async fn test_insert_and_get_feed() {
        let (db, user_id) = test_db().await;
        let mut settings = FeedSettings::new("Club", SourceType::Group, "-100");
        settings.description = Some("desc".to_string());

        let feed = db.insert_feed(user_id, &settings, "tok1").await.unwrap();
        assert!(feed.id > 0);
        assert_eq!(feed.user_id, user_id);
        assert_eq!(feed.source_type, SourceType::Group);
        assert_eq!(feed.source_id, "-100");
        assert_eq!(feed.items_count, 20);
        assert!(feed.include_attachments);
        assert!(!feed.is_public);
        assert_eq!(feed.access_token, "tok1");
        assert_eq!(feed.last_fetched, None);

        assert_eq!(db.get_feed(feed.id).await.unwrap(), Some(feed));
    }

    #[tokio::test]
    async fn test_access_token_is_unique() {
        let (db, user_id) = test_db().await;
        let settings = FeedSettings::new("A", SourceType::User, "1");
        db.insert_feed(user_id, &settings, "same").await.unwrap();
        assert!(db.insert_feed(user_id, &settings, "same").await.is_err());
    }

    #[tokio::test]
    async fn test_feeds_are_scoped_to_user() {
        let (db, alice) = test_db().await;
        let bob = db.ensure_user("bob").await.unwrap().id;

        db.insert_feed(alice, &FeedSettings::new("A", SourceType::User, "1"), "t1")
            .await
            .unwrap();
        db.insert_feed(bob, &FeedSettings::new("B", SourceType::User, "2"), "t2")
            .await
            .unwrap();

        let feeds = db.get_feeds_for_user(alice).await.unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].title, "A");
    }

    #[tokio::test]
    async fn test_update_feed_invalidates_cache() {
        let (db, user_id) = test_db().await;
        let feed = db
            .insert_feed(user_id, &FeedSettings::new("Old", SourceType::Group, "-1"), "t")
            .await
            .unwrap();
        db.store_cached_feed(feed.id, "<rss/>", 100).await.unwrap();

        let mut settings = FeedSettings::new("New", SourceType::Page, "-2");
        settings.items_count = 50;
        settings.is_public = true;
        assert!(db.update_feed(feed.id, &settings).await.unwrap());

        let updated = db.get_feed(feed.id).await.unwrap().unwrap();
        assert_eq!(updated.title, "New");
        assert_eq!(updated.source_type, SourceType::Page);
        assert_eq!(updated.items_count, 50);
        assert!(updated.is_public);
        assert_eq!(updated.access_token, "t");
        assert!(db.get_cached_feed(feed.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_feed() {
        let (db, _) = test_db().await;
        let settings = FeedSettings::new("X", SourceType::User, "1");
        assert!(!db.update_feed(999, &settings).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_feed_cascades_cache() {
        let (db, user_id) = test_db().await;
        let feed = db
            .insert_feed(user_id, &FeedSettings::new("F", SourceType::User, "1"), "t")
            .await
            .unwrap();
        db.store_cached_feed(feed.id, "doc", 1).await.unwrap();

        assert!(db.delete_feed(feed.id).await.unwrap());
        assert!(!db.delete_feed(feed.id).await.unwrap());
        assert!(db.get_feed(feed.id).await.unwrap().is_none());

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feed_cache")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }
}
