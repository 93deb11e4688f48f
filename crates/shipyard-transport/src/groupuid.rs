//! GroupUID extraction from the push side channel.
//!
//! The platform reports the outcome of a push as sideband messages, which git
//! prints prefixed with `remote: `. A successful push carries
//! `deploy: [{"groupUid": "..."}]`; a rejected one carries
//! `error: {"code": ..., "message": ..., "errors": [...]}`.

use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use shipyard_core::{Error, GroupUid, RemoteFault, Result};

/// Prefix git puts in front of sideband lines.
pub const REMOTE_PREFIX: &str = "remote: ";

const DEPLOY_MARKER: &str = "deploy:";
const ERROR_MARKER: &str = "error:";

/// Trailing whitespace and terminal control sequences.
static TRAILING_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\x1b\[[0-9;]*[A-Za-z]|\s)+$").unwrap());

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployEntry {
    group_uid: String,
}

/// Find the deployment's GroupUID in push output.
///
/// Lines without the sideband prefix are never considered, so local git
/// messages cannot be mistaken for a platform response. The first marker
/// found decides the result.
pub fn extract_group_uid(output: &str) -> Result<GroupUid> {
    // Progress segments end in a bare carriage return, so one terminal line
    // can hold several sideband messages.
    for line in output.split(['\n', '\r']) {
        let Some(line) = line.strip_prefix(REMOTE_PREFIX) else {
            continue;
        };
        let line = TRAILING_NOISE.replace(line.trim_start(), "");

        if let Some(payload) = line.strip_prefix(DEPLOY_MARKER) {
            let entries: Vec<DeployEntry> = serde_json::from_str(payload.trim())
                .map_err(|e| Error::Internal(format!("malformed deploy response: {}", e)))?;
            return entries
                .into_iter()
                .next()
                .map(|entry| GroupUid::new(entry.group_uid))
                .ok_or(Error::GroupUidNotFound);
        }

        if let Some(payload) = line.strip_prefix(ERROR_MARKER) {
            // Plain-text errors are not structured faults; keep scanning.
            if let Ok(fault) = serde_json::from_str::<RemoteFault>(payload.trim()) {
                return Err(Error::Remote(fault));
            }
        }
    }

    Err(Error::GroupUidNotFound)
}
