//! Error types for Shipyard.

use thiserror::Error;

use crate::fault::RemoteFault;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} is required but was not found on PATH")]
    ToolNotFound(String),

    #[error("{tool} {found} is too old, {required} or newer is required")]
    ToolTooOld {
        tool: String,
        found: String,
        required: String,
    },

    #[error("command failed: {0}")]
    CommandFailed(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("push failed: {0}")]
    PushFailed(String),

    #[error(transparent)]
    Remote(#[from] RemoteFault),

    #[error("can't find deployment group UID in the push response")]
    GroupUidNotFound,

    #[error("deployment failed:\n{0}")]
    DeploymentFailed(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error reports a missing remote resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
