//! Repository provenance attached to a deployment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A local repository backing one or more of the deployed services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// IDs of the services whose sources live in this repository.
    pub services: Vec<String>,
    /// Repository path relative to the project root ("." for the root itself).
    pub path: String,
    /// Normalized `https://` origin URL, credentials stripped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    pub commit: String,
    pub commit_author: String,
    pub commit_author_email: String,
    pub commit_message: String,
    pub commit_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub clean_working_tree: bool,
}

/// Provenance document embedded in the deployment commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub cli_version: String,
    pub time: DateTime<Utc>,
    pub repos: Vec<Repository>,
    /// Services with no discoverable local repository.
    pub repoless: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Provenance {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            cli_version: crate::CLIENT_VERSION.to_string(),
            time,
            repos: Vec::new(),
            repoless: Vec::new(),
            metadata: None,
        }
    }
}
