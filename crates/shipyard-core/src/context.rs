//! Platform context a deployment runs against.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An access token. Never shown in `Debug` or `Display` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token value, for handing to a transport or HTTP client.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Replace every occurrence of the token in `text` with a placeholder,
    /// including its percent-encoded form as it appears in URLs.
    pub fn redact(&self, text: &str) -> String {
        if self.0.is_empty() {
            return text.to_string();
        }
        let redacted = text.replace(&self.0, "[REDACTED]");
        let encoded = urlencoding::encode(&self.0);
        if encoded == self.0.as_str() {
            redacted
        } else {
            redacted.replace(&*encoded, "[REDACTED]")
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// The remote platform a deploy targets, with the credentials used for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformContext {
    /// Name of the configured remote (e.g. "cloud").
    pub remote: String,
    /// Infrastructure domain, e.g. `shipyard.cloud`.
    pub infrastructure: String,
    pub username: String,
    pub token: AccessToken,
    /// Skip TLS certificate verification for git and API traffic.
    pub skip_tls_verify: bool,
}

impl PlatformContext {
    /// Git endpoint receiving the deployment package for a project.
    pub fn git_remote_url(&self, project_id: &str) -> String {
        format!("https://git.{}/{}.git", self.infrastructure, project_id)
    }

    /// Git endpoint with the credentials embedded in the authority.
    pub fn git_remote_url_with_credentials(&self, project_id: &str) -> String {
        format!(
            "https://{}:{}@git.{}/{}.git",
            urlencoding::encode(&self.username),
            urlencoding::encode(self.token.expose()),
            self.infrastructure,
            project_id
        )
    }

    /// Base URL of the platform REST API.
    pub fn api_url(&self) -> String {
        format!("https://api.{}", self.infrastructure)
    }

    /// Public URL of a deployed service.
    pub fn service_url(&self, service_id: &str, project_id: &str) -> String {
        format!("https://{}-{}.{}", service_id, project_id, self.infrastructure)
    }
}
