use thiserror::Error;

/// Failures constructing the Telegram backend. Send-time failures use
/// [`feedrelay_channels::SendError`] instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("telegram bot token is empty")]
    EmptyToken,

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
