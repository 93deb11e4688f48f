//! Deployment feedback for Shipyard.
//!
//! After a push, the platform builds and deploys each service asynchronously
//! and records its progress as activities. This crate polls those activities,
//! reconciles them into one state per service and reports the outcome.

pub mod client;
pub mod header;
pub mod machine;
pub mod watch;

pub use client::ActivitiesClient;
pub use machine::{WatchMode, next_state};
pub use watch::{FeedbackWatch, WatchEvent, WatchOptions, WatchReport};
