use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] feedrelay_storage::Error),

    #[error(transparent)]
    Fetch(#[from] feedrelay_feed::FetchError),

    #[error("a polling cycle is already in progress")]
    CycleInProgress,

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
