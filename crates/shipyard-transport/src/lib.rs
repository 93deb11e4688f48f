//! Deployment transports for Shipyard.
//!
//! Provides transport implementations for uploading deployment packages:
//! - `ExternalTransport`, driving the `git` binary
//! - `EmbeddedTransport`, using libgit2 in-process
//!
//! Both read the deployment's GroupUID (or a structured error) from the push
//! side channel.

pub mod credential;
pub mod diagnostics;
pub mod embedded;
pub mod external;
pub mod filter;
pub mod groupuid;
pub mod version;

pub use embedded::EmbeddedTransport;
pub use external::ExternalTransport;
pub use shipyard_core::transport::{IgnoredPaths, Transport, TransportSettings};

use shipyard_core::{PlatformContext, ServiceInfo};
use std::path::PathBuf;

/// Name of the remote the deployment is pushed to.
pub const REMOTE_NAME: &str = "shipyard";

/// Branch receiving deployments on the platform.
pub const DEPLOY_REF: &str = "refs/heads/master";

/// Commit identity used for deployment commits.
pub(crate) fn author_identity(context: &PlatformContext) -> (String, String) {
    let email = if context.username.contains('@') {
        context.username.clone()
    } else {
        format!("deploy@{}", context.infrastructure)
    };
    ("Shipyard".to_string(), email)
}

/// Path of a service inside the staged package, relative to its root.
pub(crate) fn staged_path(settings: &TransportSettings, service: &ServiceInfo) -> PathBuf {
    match service.relative_to(&settings.source_path) {
        Some(rel) if !rel.as_os_str().is_empty() => rel,
        _ => PathBuf::from("."),
    }
}
