//! Persistence for the relay: registered feeds, the posted-entry ledger
//! that backs at-most-once delivery, and aggregate run status.

pub mod error;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod types;

pub use {
    error::{Error, Result},
    store::FeedStore,
    store_memory::InMemoryStore,
    store_sqlite::SqliteStore,
    types::{DEFAULT_SCHEDULE_MINUTES, Feed, FeedPatch, SystemStatus},
};

/// Run database migrations. Called at startup before any store method,
/// automatically by [`SqliteStore::new`].
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
