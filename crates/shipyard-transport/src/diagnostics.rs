//! Interpretation of push diagnostics.

use shipyard_core::{AccessToken, Error, GroupUid, Result};

use crate::groupuid::{REMOTE_PREFIX, extract_group_uid};

/// Substrings git prints when the platform rejects the credentials.
const AUTH_FAILURES: &[&str] = &[
    "Authentication failed",
    "could not read Username",
    "could not read Password",
    "The requested URL returned error: 401",
    "The requested URL returned error: 403",
    "HTTP Basic: Access denied",
    "remote authentication required",
    "status code: 401",
    "status code: 403",
];

/// Whether the output reports rejected credentials.
pub fn is_auth_failure(output: &str) -> bool {
    AUTH_FAILURES.iter().any(|needle| output.contains(needle))
}

/// Local protocol error lines (`error:` / `fatal:`), excluding platform sideband.
pub fn protocol_errors(output: &str) -> Vec<&str> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with(REMOTE_PREFIX.trim_end()))
        .filter(|line| line.starts_with("error:") || line.starts_with("fatal:"))
        .collect()
}

/// Turn everything a push printed into its outcome.
///
/// Credential failures always become `InvalidCredentials` so credential-bearing
/// output never reaches the user. A platform response wins over local errors.
pub fn interpret_push(output: &str, succeeded: bool, token: &AccessToken) -> Result<GroupUid> {
    if is_auth_failure(output) {
        return Err(Error::InvalidCredentials);
    }

    match extract_group_uid(output) {
        Err(Error::GroupUidNotFound) => {}
        result => return result,
    }

    if succeeded {
        return Err(Error::GroupUidNotFound);
    }

    let errors = protocol_errors(output);
    if errors.is_empty() {
        Err(Error::PushFailed("push was rejected".to_string()))
    } else {
        Err(Error::PushFailed(token.redact(&errors.join("\n"))))
    }
}
