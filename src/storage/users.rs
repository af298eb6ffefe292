use anyhow::{Context, Result};
use chrono::Utc;

use super::schema::Database;
use super::types::User;

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Look up a user by name, creating it on first use.
    pub async fn ensure_user(&self, username: &str) -> Result<User> {
        sqlx::query("INSERT INTO users (username, created_at) VALUES (?, ?) ON CONFLICT(username) DO NOTHING")
            .bind(username)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to create user '{}'", username))?;

        self.get_user_by_username(username)
            .await?
            .with_context(|| format!("User '{}' vanished after insert", username))
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}
