//! Poll scheduling and delivery. Each feed carries its own interval; the
//! timer loop wakes for the earliest due feed, spawns the delivery
//! pipeline for each due feed as its own task, and schedules the next
//! poll a full interval after the attempt finishes.

pub mod error;
pub mod parse;
pub mod pipeline;
pub mod service;

pub use {
    error::{Error, Result},
    parse::parse_schedule,
    pipeline::{FeedOutcome, Pipeline, PipelineOptions},
    service::{FeedCreate, PollService, ServiceStatus},
};
