//! Deploy orchestration for Shipyard.
//!
//! This crate handles:
//! - Finding the services declared in a project tree
//! - Discovering the repositories backing them (provenance)
//! - Staging the deployment package
//! - Driving a `Transport` through a complete deploy

pub mod discovery;
pub mod error;
pub mod message;
pub mod normalize;
pub mod orchestrator;
pub mod package;
pub mod services;

pub use discovery::{Discovery, discover};
pub use error::{DeployError, DeployResult, DiscoveryError};
pub use normalize::normalize_origin;
pub use orchestrator::{DeployParams, DeployReceipt, Deployer, Follow};
pub use services::find_services;
