//! Lifecycle activities reported by the platform.
//!
//! The platform records an activity for every build and deploy step of a
//! deployment. Activities are tagged with the service they concern and the
//! GroupUID of the push that triggered them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::{GroupUid, Result};

/// Kind of a lifecycle activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    BuildStarted,
    BuildPushed,
    BuildSucceeded,
    BuildFailed,
    DeployCreated,
    DeployPending,
    DeployStarted,
    DeploySucceeded,
    DeployFailed,
    DeployCanceled,
    DeployTimeout,
    DeployRollback,
    /// Any activity type this client does not know about.
    #[serde(other)]
    Unknown,
}

impl ActivityType {
    /// Every known lifecycle type, in lifecycle order.
    pub const ALL: [ActivityType; 12] = [
        ActivityType::BuildStarted,
        ActivityType::BuildPushed,
        ActivityType::BuildSucceeded,
        ActivityType::BuildFailed,
        ActivityType::DeployCreated,
        ActivityType::DeployPending,
        ActivityType::DeployStarted,
        ActivityType::DeploySucceeded,
        ActivityType::DeployFailed,
        ActivityType::DeployCanceled,
        ActivityType::DeployTimeout,
        ActivityType::DeployRollback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::BuildStarted => "BUILD_STARTED",
            ActivityType::BuildPushed => "BUILD_PUSHED",
            ActivityType::BuildSucceeded => "BUILD_SUCCEEDED",
            ActivityType::BuildFailed => "BUILD_FAILED",
            ActivityType::DeployCreated => "DEPLOY_CREATED",
            ActivityType::DeployPending => "DEPLOY_PENDING",
            ActivityType::DeployStarted => "DEPLOY_STARTED",
            ActivityType::DeploySucceeded => "DEPLOY_SUCCEEDED",
            ActivityType::DeployFailed => "DEPLOY_FAILED",
            ActivityType::DeployCanceled => "DEPLOY_CANCELED",
            ActivityType::DeployTimeout => "DEPLOY_TIMEOUT",
            ActivityType::DeployRollback => "DEPLOY_ROLLBACK",
            ActivityType::Unknown => "UNKNOWN",
        }
    }

    /// Whether this is one of the five deploy outcomes.
    pub fn is_deploy_terminal(&self) -> bool {
        matches!(
            self,
            ActivityType::DeploySucceeded
                | ActivityType::DeployFailed
                | ActivityType::DeployCanceled
                | ActivityType::DeployTimeout
                | ActivityType::DeployRollback
        )
    }

    /// Human readable failure kind, for states that end a deployment unsuccessfully.
    pub fn failure_kind(&self) -> Option<&'static str> {
        match self {
            ActivityType::BuildFailed => Some("build failed"),
            ActivityType::DeployFailed => Some("deploy failed"),
            ActivityType::DeployCanceled => Some("deploy canceled"),
            ActivityType::DeployTimeout => Some("deploy timed out"),
            ActivityType::DeployRollback => Some("deploy rolled back"),
            _ => None,
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event for a build or deploy of one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub group_uid: Option<GroupUid>,
    /// Creation time in milliseconds since the epoch.
    #[serde(default)]
    pub created_at: i64,
}

impl Activity {
    pub fn new(kind: ActivityType, service_id: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(
            "serviceId".to_string(),
            serde_json::Value::String(service_id.to_string()),
        );
        Self {
            id: String::new(),
            kind,
            metadata,
            group_uid: None,
            created_at: 0,
        }
    }

    /// The service this activity concerns, from the `serviceId` metadata key.
    pub fn service_id(&self) -> Option<&str> {
        self.metadata.get("serviceId").and_then(|v| v.as_str())
    }
}

/// Filter for listing activities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityFilter {
    pub group_uid: Option<GroupUid>,
}

impl ActivityFilter {
    pub fn for_group(group_uid: GroupUid) -> Self {
        Self {
            group_uid: Some(group_uid),
        }
    }
}

/// Read access to the platform's activity log.
#[async_trait]
pub trait ActivitiesService: Send + Sync {
    /// List activities for a project, newest first.
    ///
    /// Returns `Error::NotFound` when the project or deployment does not exist.
    async fn list(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        filter: &ActivityFilter,
    ) -> Result<Vec<Activity>>;
}
