use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("feed not found: {feed_id}")]
    FeedNotFound { feed_id: String },
}

impl Error {
    #[must_use]
    pub fn feed_not_found(feed_id: impl Into<String>) -> Self {
        Self::FeedNotFound {
            feed_id: feed_id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
