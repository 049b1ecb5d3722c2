use thiserror::Error;

/// Why a feed could not be read. A feed that parses but contains zero
/// entries is not an error.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("feed returned HTTP {status}")]
    Status { status: u16 },

    #[error("fetch timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("feed did not parse: {message}")]
    Parse { message: String },
}

impl FetchError {
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
