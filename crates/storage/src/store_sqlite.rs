//! SQLite-backed store using sqlx.

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
};

use crate::{
    Result,
    error::Error,
    store::FeedStore,
    types::{Feed, SystemStatus},
};

/// SQLite-backed persistence for feeds, the ledger, and status.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new store with its own connection pool and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a store using an existing pool (migrations must already be run).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeedStore for SqliteStore {
    async fn load_feeds(&self) -> Result<Vec<Feed>> {
        let rows = sqlx::query("SELECT data FROM feeds")
            .fetch_all(&self.pool)
            .await?;

        let mut feeds = Vec::with_capacity(rows.len());
        for row in rows {
            let data: String = row.get("data");
            let feed: Feed = serde_json::from_str(&data)?;
            feeds.push(feed);
        }
        Ok(feeds)
    }

    async fn get_feed(&self, id: &str) -> Result<Feed> {
        let row = sqlx::query("SELECT data FROM feeds WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::feed_not_found(id))?;

        let data: String = row.get("data");
        Ok(serde_json::from_str(&data)?)
    }

    async fn save_feed(&self, feed: &Feed) -> Result<()> {
        let data = serde_json::to_string(feed)?;
        sqlx::query(
            "INSERT INTO feeds (id, data) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data",
        )
        .bind(&feed.id)
        .bind(&data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_feed(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::feed_not_found(id));
        }
        Ok(())
    }

    async fn set_last_check(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut feed = self.get_feed(id).await?;
        feed.last_check = Some(at);
        self.save_feed(&feed).await
    }

    async fn is_posted(&self, feed_id: &str, entry_id: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM posted_entries WHERE feed_id = ? AND entry_id = ?",
        )
        .bind(feed_id)
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn mark_posted(&self, feed_id: &str, entry_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO posted_entries (feed_id, entry_id, posted_at)
             VALUES (?, ?, ?)",
        )
        .bind(feed_id)
        .bind(entry_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn posted_count(&self, feed_id: &str) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM posted_entries WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.get("n");
        Ok(n as u64)
    }

    async fn purge_posted(&self, feed_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM posted_entries WHERE feed_id = ?")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn load_status(&self) -> Result<SystemStatus> {
        let row = sqlx::query("SELECT data FROM system_status WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: String = row.get("data");
                Ok(serde_json::from_str(&data)?)
            },
            None => Ok(SystemStatus::default()),
        }
    }

    async fn save_status(&self, status: &SystemStatus) -> Result<()> {
        let data = serde_json::to_string(status)?;
        sqlx::query(
            "INSERT INTO system_status (id, data) VALUES (1, ?)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data",
        )
        .bind(&data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::types::Feed};

    async fn make_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn make_feed(name: &str) -> Feed {
        Feed::new(name, format!("http://example.com/{name}.xml"), "-100555")
    }

    #[tokio::test]
    async fn test_sqlite_feed_roundtrip() {
        let store = make_store().await;
        store.save_feed(&make_feed("a")).await.unwrap();
        store.save_feed(&make_feed("b")).await.unwrap();

        let feeds = store.load_feeds().await.unwrap();
        assert_eq!(feeds.len(), 2);
    }

    #[tokio::test]
    async fn test_sqlite_feed_upsert() {
        let store = make_store().await;
        let mut feed = make_feed("a");
        store.save_feed(&feed).await.unwrap();

        feed.name = "renamed".into();
        store.save_feed(&feed).await.unwrap();

        let loaded = store.get_feed(&feed.id).await.unwrap();
        assert_eq!(loaded.name, "renamed");
        assert_eq!(store.load_feeds().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_delete_not_found() {
        let store = make_store().await;
        let err = store.delete_feed("nope").await.unwrap_err();
        assert!(matches!(err, Error::FeedNotFound { .. }));
    }

    #[tokio::test]
    async fn test_sqlite_set_last_check() {
        let store = make_store().await;
        let feed = make_feed("a");
        store.save_feed(&feed).await.unwrap();

        let now = Utc::now();
        store.set_last_check(&feed.id, now).await.unwrap();

        let loaded = store.get_feed(&feed.id).await.unwrap();
        assert_eq!(loaded.last_check.unwrap().timestamp(), now.timestamp());
    }

    #[tokio::test]
    async fn test_sqlite_mark_posted_idempotent() {
        let store = make_store().await;
        assert!(store.mark_posted("f1", "e1").await.unwrap());
        assert!(!store.mark_posted("f1", "e1").await.unwrap());
        assert!(store.is_posted("f1", "e1").await.unwrap());
        assert!(!store.is_posted("f1", "e2").await.unwrap());
        assert_eq!(store.posted_count("f1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_ledger_scoped_per_feed() {
        let store = make_store().await;
        assert!(store.mark_posted("f1", "e1").await.unwrap());
        assert!(store.mark_posted("f2", "e1").await.unwrap());
        assert_eq!(store.posted_count("f1").await.unwrap(), 1);
        assert_eq!(store.posted_count("f2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_purge_posted() {
        let store = make_store().await;
        store.mark_posted("f1", "e1").await.unwrap();
        store.mark_posted("f1", "e2").await.unwrap();
        assert_eq!(store.purge_posted("f1").await.unwrap(), 2);
        assert_eq!(store.posted_count("f1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sqlite_status_roundtrip() {
        let store = make_store().await;
        let empty = store.load_status().await.unwrap();
        assert_eq!(empty.entries_posted, 0);

        let status = SystemStatus {
            entries_posted: 7,
            feeds_processed: 3,
            errors: 1,
            last_check: Some(Utc::now()),
            started_at: Some(Utc::now()),
        };
        store.save_status(&status).await.unwrap();

        let loaded = store.load_status().await.unwrap();
        assert_eq!(loaded.entries_posted, 7);
        assert_eq!(loaded.errors, 1);
    }
}
