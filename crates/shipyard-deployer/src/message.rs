//! Deployment commit messages.

use shipyard_core::Provenance;

use crate::DeployResult;

/// Build the commit message carrying the provenance document.
///
/// The subject names the deployment time; the body is the JSON document the
/// platform stores alongside the deployment.
pub fn commit_message(provenance: &Provenance) -> DeployResult<String> {
    let body = serde_json::to_string_pretty(provenance)?;
    Ok(format!(
        "Deployment {}\n\n{}\n",
        provenance.time.to_rfc3339(),
        body
    ))
}
