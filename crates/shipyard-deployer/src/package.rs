//! Deployment package staging.
//!
//! Each service's files are copied into the staging directory at the same
//! relative path they have in the project, minus ignored paths, and the copied
//! manifest is rewritten for the deployment.

use std::path::Path;
use tracing::{debug, warn};

use shipyard_config::ManifestRewrite;
use shipyard_config::manifest::rewrite_manifest_file;
use shipyard_core::{IgnoredPaths, ServiceInfoList};
use shipyard_transport::filter::{is_default_ignored, is_excluded};

use crate::{DeployError, DeployResult};

/// Manifest fields overridden for every staged service.
#[derive(Debug, Clone, Default)]
pub struct Overrides<'a> {
    pub image: Option<&'a str>,
    pub region: Option<&'a str>,
}

/// Copy the services from `source` into `work_dir` and rewrite their manifests.
pub async fn stage_package(
    source: &Path,
    work_dir: &Path,
    services: &ServiceInfoList,
    ignored: &IgnoredPaths,
    overrides: &Overrides<'_>,
) -> DeployResult<()> {
    for service in services {
        let rel = service
            .relative_to(source)
            .ok_or_else(|| DeployError::OutsideProject {
                service: service.service_id.clone(),
                root: source.display().to_string(),
            })?;
        let dest = work_dir.join(&rel);

        debug!(service = %service.service_id, dest = %dest.display(), "Staging service");
        copy_tree(&service.location, &dest, ignored).await?;

        rewrite_manifest_file(
            &dest,
            ManifestRewrite {
                service_id: &service.service_id,
                image: overrides.image,
                region: overrides.region,
            },
        )
        .await?;
    }
    Ok(())
}

/// Recursively copy a directory, skipping ignored paths.
#[async_recursion::async_recursion]
async fn copy_tree(from: &Path, to: &Path, ignored: &IgnoredPaths) -> DeployResult<()> {
    tokio::fs::create_dir_all(to).await?;

    let mut entries = tokio::fs::read_dir(from).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if is_default_ignored(&path) || is_excluded(ignored, &path) {
            continue;
        }

        let metadata = match tokio::fs::symlink_metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        let target = to.join(entry.file_name());
        if metadata.is_symlink() {
            copy_link(&path, &target).await?;
        } else if metadata.is_dir() {
            copy_tree(&path, &target, ignored).await?;
        } else if metadata.is_file() {
            tokio::fs::copy(&path, &target).await?;
        }
    }
    Ok(())
}

/// Recreate a symlink in the staging tree. Git stores links as links, and a
/// link back to an ancestor must not be walked.
#[cfg(unix)]
async fn copy_link(from: &Path, to: &Path) -> DeployResult<()> {
    let link = tokio::fs::read_link(from).await?;
    tokio::fs::symlink(&link, to).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn copy_link(from: &Path, to: &Path) -> DeployResult<()> {
    match tokio::fs::metadata(from).await {
        Ok(metadata) if metadata.is_file() => {
            tokio::fs::copy(from, to).await?;
        }
        _ => warn!(path = %from.display(), "Skipping directory or dangling symlink"),
    }
    Ok(())
}
