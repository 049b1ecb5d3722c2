//! Telegram delivery backend. Implements
//! [`feedrelay_channels::MessageSender`] over the Bot API `sendMessage`
//! method, with Retry-After-aware backoff on 429 responses.

pub mod error;
pub mod outbound;

pub use {
    error::{Error, Result},
    outbound::TelegramSender,
};
