//! Feed fetching, entry identity, and message rendering.
//! Fetching goes through the [`FeedFetcher`] trait so the scheduler can be
//! driven by a mock in tests.

pub mod error;
pub mod fetch;
pub mod render;
pub mod types;

pub use error::{FetchError, Result};
pub use fetch::{FeedFetcher, FeedProbe, HttpFetcher};
pub use render::{MessageTemplate, render};
pub use types::{Entry, entry_id};
