//! Core domain types and traits for Shipyard deployments.
//!
//! This crate contains:
//! - Declared services and the platform context a deploy runs against
//! - The `Transport` capability used to upload a deployment package
//! - Repository provenance attached to a deployment
//! - Activity types reported by the platform and the `ActivitiesService` trait
//! - Shared error types

pub mod activity;
pub mod context;
pub mod error;
pub mod fault;
pub mod id;
pub mod provenance;
pub mod service;
pub mod transport;

pub use activity::{ActivitiesService, Activity, ActivityFilter, ActivityType};
pub use context::{AccessToken, PlatformContext};
pub use error::{Error, Result};
pub use fault::{FaultDetail, RemoteFault};
pub use id::GroupUid;
pub use provenance::{Provenance, Repository};
pub use service::{ServiceInfo, ServiceInfoList};
pub use transport::{IgnoredPaths, Transport, TransportSettings};

/// Version of the Shipyard client, embedded in commit messages and user agents.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
