//! Repository discovery.
//!
//! Finds the local repositories backing the deployed services and reads the
//! provenance recorded in the deployment commit.

use chrono::{DateTime, Utc};
use git2::{ErrorCode, StatusOptions};
use std::path::Path;
use tracing::debug;

use shipyard_core::{Repository, ServiceInfoList};

use crate::DiscoveryError;
use crate::normalize::normalize_origin;

const DEFAULT_REMOTE: &str = "origin";

/// Repositories found for a set of services.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub repos: Vec<Repository>,
    /// Services with no repository of their own.
    pub repoless: Vec<String>,
}

/// Discover the repositories for `services` under `root`.
///
/// The root is tried first as a single repository covering every service.
/// Otherwise each service directory is opened on its own; a directory that is
/// not a repository makes its service repoless, while a repository that cannot
/// be read is an error.
pub async fn discover(
    root: &Path,
    services: &ServiceInfoList,
) -> Result<Discovery, DiscoveryError> {
    let root = root.to_path_buf();
    let services = services.clone();
    tokio::task::spawn_blocking(move || discover_blocking(&root, &services))
        .await
        .map_err(|e| DiscoveryError::Task(e.to_string()))?
}

fn discover_blocking(root: &Path, services: &ServiceInfoList) -> Result<Discovery, DiscoveryError> {
    if let Some(repo) = open(root)? {
        debug!(path = %root.display(), "Project root is a repository");
        let record = inspect(&repo, root, ".", services.ids())?;
        return Ok(Discovery {
            repos: vec![record],
            repoless: Vec::new(),
        });
    }

    let mut discovery = Discovery::default();
    for service in services {
        match open(&service.location)? {
            Some(repo) => {
                let path = service
                    .relative_to(root)
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| ".".to_string());
                let record = inspect(
                    &repo,
                    &service.location,
                    &path,
                    vec![service.service_id.clone()],
                )?;
                discovery.repos.push(record);
            }
            None => {
                debug!(service = %service.service_id, "No repository for service");
                discovery.repoless.push(service.service_id.clone());
            }
        }
    }
    Ok(discovery)
}

/// Open the repository rooted exactly at `path`, if there is one.
fn open(path: &Path) -> Result<Option<git2::Repository>, DiscoveryError> {
    match git2::Repository::open(path) {
        Ok(repo) => Ok(Some(repo)),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(source) => Err(DiscoveryError::Git {
            path: path.display().to_string(),
            source,
        }),
    }
}

fn inspect(
    repo: &git2::Repository,
    location: &Path,
    path: &str,
    services: Vec<String>,
) -> Result<Repository, DiscoveryError> {
    let git_err = |source: git2::Error| DiscoveryError::Git {
        path: location.display().to_string(),
        source,
    };

    let head = match repo.head() {
        Ok(head) => head,
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
            return Err(DiscoveryError::NoCommits {
                path: location.display().to_string(),
            });
        }
        Err(e) => return Err(git_err(e)),
    };

    let branch = if head.is_branch() {
        head.shorthand().map(|s| s.to_string())
    } else {
        None
    };

    let remote_name = branch
        .as_ref()
        .and_then(|b| {
            repo.config()
                .ok()?
                .get_string(&format!("branch.{}.remote", b))
                .ok()
        })
        .unwrap_or_else(|| DEFAULT_REMOTE.to_string());
    let origin = repo
        .find_remote(&remote_name)
        .ok()
        .and_then(|remote| remote.url().map(normalize_origin));

    let commit = head.peel_to_commit().map_err(git_err)?;
    let author = commit.author();
    let commit_date =
        DateTime::<Utc>::from_timestamp(commit.time().seconds(), 0).unwrap_or_default();

    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .exclude_submodules(true);
    let clean_working_tree = repo
        .statuses(Some(&mut opts))
        .map_err(git_err)?
        .iter()
        .all(|entry| entry.status().is_empty() || entry.status().is_ignored());

    Ok(Repository {
        services,
        path: path.to_string(),
        origin,
        commit: commit.id().to_string(),
        commit_author: author.name().unwrap_or_default().to_string(),
        commit_author_email: author.email().unwrap_or_default().to_string(),
        commit_message: commit.message().unwrap_or_default().trim_end().to_string(),
        commit_date,
        branch,
        clean_working_tree,
    })
}
