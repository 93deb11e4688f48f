//! Declared services and their local source locations.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// A deployable unit declared in the project tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Service identifier on the platform.
    pub service_id: String,
    /// Absolute path to the service's source directory.
    pub location: PathBuf,
}

impl ServiceInfo {
    pub fn new(service_id: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        Self {
            service_id: service_id.into(),
            location: location.into(),
        }
    }

    /// Location relative to `root`, or `None` when the service lives outside it.
    pub fn relative_to(&self, root: &Path) -> Option<PathBuf> {
        self.location.strip_prefix(root).ok().map(Path::to_path_buf)
    }
}

/// The services resolved for one deploy invocation, ordered by service ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceInfoList(Vec<ServiceInfo>);

impl ServiceInfoList {
    pub fn new(mut services: Vec<ServiceInfo>) -> Self {
        services.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        Self(services)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ServiceInfo> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.0.iter().map(|s| s.service_id.clone()).collect()
    }

    pub fn get(&self, service_id: &str) -> Option<&ServiceInfo> {
        self.0.iter().find(|s| s.service_id == service_id)
    }

    /// Narrow the list down to a single service.
    pub fn only(&self, service_id: &str) -> Result<Self> {
        self.get(service_id)
            .map(|s| Self(vec![s.clone()]))
            .ok_or_else(|| Error::NotFound(format!("service '{}' in this project", service_id)))
    }
}

impl<'a> IntoIterator for &'a ServiceInfoList {
    type Item = &'a ServiceInfo;
    type IntoIter = std::slice::Iter<'a, ServiceInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<ServiceInfo> for ServiceInfoList {
    fn from_iter<I: IntoIterator<Item = ServiceInfo>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
