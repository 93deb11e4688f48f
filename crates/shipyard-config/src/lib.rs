//! Configuration for Shipyard.
//!
//! This crate handles:
//! - The KDL configuration file with remotes and transport selection
//! - Output settings threaded through the transports and renderer
//! - Reading and rewriting service manifests (`shipyard.json`)

pub mod error;
pub mod manifest;
pub mod settings;

pub use error::{ConfigError, ConfigResult};
pub use manifest::{MANIFEST_FILE, ManifestRewrite};
pub use settings::{Config, OutputConfig, Overrides, RemoteConfig, Resolved, TransportKind};
