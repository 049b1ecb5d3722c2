//! Config loading for the relay: schema types, file discovery, and
//! `${ENV_VAR}` substitution in config values.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{discover_and_load, load_config},
    schema::{FeedSeed, PollConfig, RelayConfig, StorageConfig, TelegramConfig},
};
