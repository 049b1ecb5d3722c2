//! Outbound delivery seam. Channel backends implement [`MessageSender`];
//! the scheduler only ever talks to the trait, so delivery tests run
//! against a recording fake.

pub mod error;

pub use error::{Result, SendError};

use async_trait::async_trait;

/// Per-message delivery options.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Suppress the channel's inline preview of the first link.
    pub disable_link_preview: bool,
}

/// A destination capable of delivering rendered entry messages.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Channel name used in logs.
    fn name(&self) -> &'static str;

    /// Deliver `text` to `chat_id`. Implementations handle their own
    /// transient retries; a returned error is final for this attempt.
    async fn send(&self, chat_id: &str, text: &str, options: &SendOptions) -> Result<()>;
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_split() {
        assert!(SendError::RateLimited { retry_after_secs: 5 }.is_retryable());
        assert!(SendError::transport("reset").is_retryable());
        assert!(!SendError::rejected("bad markup").is_retryable());
        assert!(
            !SendError::ChatNotFound {
                chat_id: "-1".into()
            }
            .is_retryable()
        );
    }
}
