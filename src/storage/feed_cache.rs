use anyhow::{Context, Result};

use super::schema::Database;
use super::types::CachedFeedDocument;

impl Database {
    // ========================================================================
    // Feed Cache Operations
    // ========================================================================

    /// The stored document for a feed, regardless of age.
    ///
    /// Freshness is decided by the caller against its own TTL.
    pub async fn get_cached_feed(&self, feed_id: i64) -> Result<Option<CachedFeedDocument>> {
        let row = sqlx::query_as::<_, CachedFeedDocument>(
            "SELECT feed_id, content, cached_at FROM feed_cache WHERE feed_id = ?",
        )
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Insert or overwrite the cached document for a feed.
    pub async fn store_cached_feed(&self, feed_id: i64, content: &str, cached_at: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feed_cache (feed_id, content, cached_at)
            VALUES (?, ?, ?)
            ON CONFLICT(feed_id) DO UPDATE SET
                content = excluded.content,
                cached_at = excluded.cached_at
        "#,
        )
        .bind(feed_id)
        .bind(content)
        .bind(cached_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to cache document for feed {}", feed_id))?;
        Ok(())
    }

    /// Record a successful render: upsert the cache row and stamp
    /// `feeds.last_fetched` with the same time, atomically.
    pub async fn complete_feed_render(&self, feed_id: i64, content: &str, now: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO feed_cache (feed_id, content, cached_at)
            VALUES (?, ?, ?)
            ON CONFLICT(feed_id) DO UPDATE SET
                content = excluded.content,
                cached_at = excluded.cached_at
        "#,
        )
        .bind(feed_id)
        .bind(content)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE feeds SET last_fetched = ? WHERE id = ?")
            .bind(now)
            .bind(feed_id)
            .execute(&mut *tx)
            .await?;

        tx.commit()
            .await
            .with_context(|| format!("Failed to record render of feed {}", feed_id))?;
        Ok(())
    }

    /// Drop the cached document so the next request renders fresh.
    pub async fn invalidate_cached_feed(&self, feed_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM feed_cache WHERE feed_id = ?")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, FeedSettings};
    use crate::vk::SourceType;

    async fn setup() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.ensure_user("alice").await.unwrap();
        let feed = db
            .insert_feed(user.id, &FeedSettings::new("F", SourceType::Group, "-1"), "tok")
            .await
            .unwrap();
        (db, feed.id)
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let (db, feed_id) = setup().await;
        assert!(db.get_cached_feed(feed_id).await.unwrap().is_none());

        db.store_cached_feed(feed_id, "<rss>1</rss>", 1000).await.unwrap();
        let cached = db.get_cached_feed(feed_id).await.unwrap().unwrap();
        assert_eq!(cached.content, "<rss>1</rss>");
        assert_eq!(cached.cached_at, 1000);
    }

    #[tokio::test]
    async fn test_store_overwrites_single_row() {
        let (db, feed_id) = setup().await;
        db.store_cached_feed(feed_id, "old", 1).await.unwrap();
        db.store_cached_feed(feed_id, "new", 2).await.unwrap();

        let cached = db.get_cached_feed(feed_id).await.unwrap().unwrap();
        assert_eq!(cached.content, "new");
        assert_eq!(cached.cached_at, 2);

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feed_cache WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_complete_render_stamps_last_fetched() {
        let (db, feed_id) = setup().await;
        db.complete_feed_render(feed_id, "doc", 1_700_000_000)
            .await
            .unwrap();

        let feed = db.get_feed(feed_id).await.unwrap().unwrap();
        assert_eq!(feed.last_fetched, Some(1_700_000_000));
        let cached = db.get_cached_feed(feed_id).await.unwrap().unwrap();
        assert_eq!(cached.cached_at, 1_700_000_000);
    }

    #[tokio::test]
    async fn test_cache_for_unknown_feed_is_rejected() {
        let db = Database::open(":memory:").await.unwrap();
        assert!(db.store_cached_feed(42, "doc", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let (db, feed_id) = setup().await;
        db.store_cached_feed(feed_id, "doc", 1).await.unwrap();
        db.invalidate_cached_feed(feed_id).await.unwrap();
        assert!(db.get_cached_feed(feed_id).await.unwrap().is_none());
        // No-op when nothing is cached.
        db.invalidate_cached_feed(feed_id).await.unwrap();
    }
}
