use thiserror::Error;

/// Delivery failure, split so callers can tell retryable conditions from
/// permanent ones.
#[derive(Debug, Error)]
pub enum SendError {
    /// The channel asked us to back off. Retryable after the given delay.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The bot is blocked or was never allowed into the chat. Permanent.
    #[error("forbidden: {description}")]
    Forbidden { description: String },

    /// The chat id does not resolve. Permanent.
    #[error("chat not found: {chat_id}")]
    ChatNotFound { chat_id: String },

    /// The channel rejected the message itself (bad markup, too long).
    /// Permanent for this message.
    #[error("rejected: {description}")]
    Rejected { description: String },

    /// Network or protocol failure reaching the channel. Retryable.
    #[error("transport: {message}")]
    Transport { message: String },

    /// Any other channel API error.
    #[error("api error {code}: {description}")]
    Api { code: u16, description: String },
}

impl SendError {
    /// Whether retrying the same message later could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transport { .. })
    }

    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn rejected(description: impl Into<String>) -> Self {
        Self::Rejected {
            description: description.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SendError>;
