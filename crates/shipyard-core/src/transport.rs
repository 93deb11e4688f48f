//! Transport trait and settings.
//!
//! A transport uploads a deployment package to the platform through a
//! version-control protocol. Operations are always called in this order:
//! `setup`, `init`, `process_ignored`, `stage`, `commit`, `add_remote`, `push`.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{GroupUid, PlatformContext, Result, ServiceInfoList};

/// Settings shared by every operation of one deploy.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub context: PlatformContext,
    pub project_id: String,
    /// Project source tree the services are copied from.
    pub source_path: PathBuf,
    /// Staging directory holding the deployment repository.
    pub work_dir: PathBuf,
}

/// Absolute paths under the source path excluded from the package.
/// A directory entry excludes its whole subtree.
pub type IgnoredPaths = BTreeSet<PathBuf>;

/// Trait for deployment transports.
#[async_trait]
pub trait Transport: Send {
    /// Name of this transport.
    fn name(&self) -> &'static str;

    /// Validate preconditions and cache derived state.
    async fn setup(
        &mut self,
        cancel: CancellationToken,
        settings: TransportSettings,
    ) -> Result<()>;

    /// Initialize the work directory as a fresh repository.
    async fn init(&mut self) -> Result<()>;

    /// Compute the paths under the source path that must not be staged.
    async fn process_ignored(&mut self) -> Result<IgnoredPaths>;

    /// Add the copied files of each service to the pending commit.
    async fn stage(&mut self, services: &ServiceInfoList) -> Result<()>;

    /// Commit the staged files, returning the commit hash. Empty commits are allowed.
    async fn commit(&mut self, message: &str) -> Result<String>;

    /// Register the platform endpoint as the push target.
    async fn add_remote(&mut self) -> Result<()>;

    /// Push the commit and return the deployment's GroupUID.
    async fn push(&mut self) -> Result<GroupUid>;

    /// Time spent in `push`.
    fn upload_duration(&self) -> Duration;

    /// User agent describing this client and transport.
    fn user_agent(&self) -> String;
}
