//! Deployment identifiers.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Identifier correlating one deployment across the builds and deploys it
/// triggers on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct GroupUid(String);

impl GroupUid {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for GroupUid {
    fn from(uid: String) -> Self {
        Self(uid)
    }
}

impl From<GroupUid> for String {
    fn from(uid: GroupUid) -> Self {
        uid.0
    }
}
