//! Deploy errors.

use shipyard_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Transport(#[from] shipyard_core::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("no services found under {0}")]
    NoServices(String),

    #[error("service '{service}' is outside the project at {root}")]
    OutsideProject { service: String, root: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures inspecting a repository that exists.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("repository at {path} has no commits")]
    NoCommits { path: String },

    #[error("can't read repository at {path}: {source}")]
    Git {
        path: String,
        #[source]
        source: git2::Error,
    },

    #[error("discovery task failed: {0}")]
    Task(String),
}

pub type DeployResult<T> = std::result::Result<T, DeployError>;
