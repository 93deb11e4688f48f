//! Structured faults reported by the platform.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A structured error returned by the platform, either from the REST API or
/// through the push side channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFault {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<FaultDetail>,
}

/// One entry of a fault's detail list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultDetail {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "remote error")?;
        } else {
            write!(f, "{}", self.message)?;
        }
        if self.code != 0 {
            write!(f, " ({})", self.code)?;
        }
        for detail in &self.errors {
            match (detail.reason.is_empty(), detail.message.is_empty()) {
                (false, false) => write!(f, "\n  {}: {}", detail.reason, detail.message)?,
                (true, false) => write!(f, "\n  {}", detail.message)?,
                (false, true) => write!(f, "\n  {}", detail.reason)?,
                (true, true) => {}
            }
        }
        Ok(())
    }
}

impl std::error::Error for RemoteFault {}
