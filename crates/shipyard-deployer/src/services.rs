//! Service discovery in a project tree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use shipyard_config::manifest::{manifest_service_id, read_manifest};
use shipyard_config::{ConfigError, MANIFEST_FILE};
use shipyard_core::{ServiceInfo, ServiceInfoList};
use shipyard_transport::filter::is_default_ignored;

use crate::{DeployError, DeployResult};

/// Find every service declared under `root`.
///
/// A directory holding a `shipyard.json` manifest is a service, identified by
/// the manifest's `id` or else by the directory name. Service directories are
/// not searched for nested services.
pub async fn find_services(root: &Path) -> DeployResult<ServiceInfoList> {
    let mut found = Vec::new();
    scan_directory(root, &mut found).await?;

    let mut seen: HashMap<&str, &Path> = HashMap::new();
    for service in &found {
        if let Some(previous) = seen.insert(&service.service_id, &service.location) {
            return Err(ConfigError::Duplicate(format!(
                "service '{}' in {} and {}",
                service.service_id,
                previous.display(),
                service.location.display()
            ))
            .into());
        }
    }

    if found.is_empty() {
        return Err(DeployError::NoServices(root.display().to_string()));
    }
    Ok(ServiceInfoList::new(found))
}

/// Recursively scan a directory.
#[async_recursion::async_recursion]
async fn scan_directory(dir: &Path, found: &mut Vec<ServiceInfo>) -> DeployResult<()> {
    if tokio::fs::try_exists(dir.join(MANIFEST_FILE)).await? {
        let manifest = read_manifest(dir).await?;
        let service_id = match manifest_service_id(&manifest) {
            Some(id) => id,
            None => directory_name(dir)?,
        };
        debug!(service = %service_id, path = %dir.display(), "Found service");
        found.push(ServiceInfo::new(service_id, dir));
        return Ok(());
    }

    let mut subdirs: Vec<PathBuf> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        // Skip editor, OS and version-control directories
        if is_default_ignored(&path) {
            continue;
        }
        if entry.file_type().await?.is_dir() {
            subdirs.push(path);
        }
    }
    subdirs.sort();

    for subdir in subdirs {
        scan_directory(&subdir, found).await?;
    }
    Ok(())
}

fn directory_name(dir: &Path) -> DeployResult<String> {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            ConfigError::MissingField(format!("service id for {}", dir.display())).into()
        })
}
