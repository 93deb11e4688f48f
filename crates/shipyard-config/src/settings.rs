//! Configuration file parsing.
//!
//! The configuration lives in `~/.shipyard/config.kdl` (or
//! `$SHIPYARD_HOME/config.kdl`):
//!
//! ```kdl
//! default-remote "cloud"
//! transport "embedded"
//!
//! remote "cloud" {
//!     infrastructure "shipyard.cloud"
//!     username "dev@example.com"
//!     token "..."
//!     skip-tls-verify #false
//! }
//! ```

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use shipyard_core::{AccessToken, PlatformContext};
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_DIR: &str = ".shipyard";
const CONFIG_FILE: &str = "config.kdl";
const DEFAULT_REMOTE: &str = "cloud";
const DEFAULT_INFRASTRUCTURE: &str = "shipyard.cloud";

/// Which transport implementation uploads the deployment package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Shell out to the `git` binary.
    #[default]
    External,
    /// Use the in-process git library.
    Embedded,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::External => write!(f, "external"),
            TransportKind::Embedded => write!(f, "embedded"),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "external" | "git" => Ok(TransportKind::External),
            "embedded" | "libgit2" => Ok(TransportKind::Embedded),
            _ => Err(format!("Unknown transport: {}", s)),
        }
    }
}

/// Output settings, passed explicitly to whatever prints or logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Log external commands and transport chatter.
    pub verbose: bool,
    /// Only print the final outcome.
    pub quiet: bool,
}

/// A configured remote platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub name: String,
    pub infrastructure: String,
    pub username: String,
    pub token: Option<String>,
    pub skip_tls_verify: bool,
}

impl RemoteConfig {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            infrastructure: DEFAULT_INFRASTRUCTURE.to_string(),
            username: String::new(),
            token: None,
            skip_tls_verify: false,
        }
    }
}

/// Values that take precedence over the configuration file (flags, environment).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub remote: Option<String>,
    pub infrastructure: Option<String>,
    pub username: Option<String>,
    pub token: Option<String>,
    pub skip_tls_verify: Option<bool>,
    pub transport: Option<TransportKind>,
}

/// Configuration resolved for one invocation.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub context: PlatformContext,
    pub transport: TransportKind,
}

/// The configuration file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub default_remote: Option<String>,
    pub transport: TransportKind,
    pub remotes: Vec<RemoteConfig>,
}

impl Config {
    /// Path of the configuration file, honoring `SHIPYARD_HOME`.
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("SHIPYARD_HOME") {
            return Some(PathBuf::from(home).join(CONFIG_FILE));
        }
        dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load the configuration file, returning defaults when it does not exist.
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parse configuration from KDL text.
    pub fn parse(kdl: &str) -> ConfigResult<Self> {
        let doc: KdlDocument = kdl.parse()?;
        let mut config = Config::default();

        for node in doc.nodes() {
            match node.name().value() {
                "default-remote" => {
                    config.default_remote = get_first_string_arg(node);
                }
                "transport" => {
                    let value = get_first_string_arg(node)
                        .ok_or_else(|| ConfigError::MissingField("transport".to_string()))?;
                    config.transport = value.parse().map_err(|message| ConfigError::InvalidValue {
                        field: "transport".to_string(),
                        message,
                    })?;
                }
                "remote" => {
                    let remote = parse_remote(node)?;
                    if config.remotes.iter().any(|r| r.name == remote.name) {
                        return Err(ConfigError::Duplicate(format!("remote '{}'", remote.name)));
                    }
                    config.remotes.push(remote);
                }
                _ => {} // Ignore unknown nodes
            }
        }

        Ok(config)
    }

    pub fn remote(&self, name: &str) -> Option<&RemoteConfig> {
        self.remotes.iter().find(|r| r.name == name)
    }

    /// Combine the file with overrides into the context used by a deploy.
    pub fn resolve(&self, overrides: &Overrides) -> ConfigResult<Resolved> {
        let name = overrides
            .remote
            .clone()
            .or_else(|| self.default_remote.clone())
            .unwrap_or_else(|| DEFAULT_REMOTE.to_string());

        let mut remote = match self.remote(&name) {
            Some(remote) => remote.clone(),
            // The default remote works without being configured.
            None if name == DEFAULT_REMOTE || overrides.infrastructure.is_some() => {
                RemoteConfig::named(&name)
            }
            None => return Err(ConfigError::UnknownRemote(name)),
        };

        if let Some(infrastructure) = &overrides.infrastructure {
            remote.infrastructure = infrastructure.clone();
        }
        if let Some(username) = &overrides.username {
            remote.username = username.clone();
        }
        if let Some(token) = &overrides.token {
            remote.token = Some(token.clone());
        }
        if let Some(skip) = overrides.skip_tls_verify {
            remote.skip_tls_verify = skip;
        }

        let token = remote
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::MissingField(format!("token for remote '{}'", name)))?;

        Ok(Resolved {
            context: PlatformContext {
                remote: remote.name,
                infrastructure: remote.infrastructure,
                username: remote.username,
                token: AccessToken::new(token),
                skip_tls_verify: remote.skip_tls_verify,
            },
            transport: overrides.transport.unwrap_or(self.transport),
        })
    }
}

fn parse_remote(node: &KdlNode) -> ConfigResult<RemoteConfig> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("remote name".to_string()))?;
    let mut remote = RemoteConfig::named(&name);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "infrastructure" => {
                    remote.infrastructure = get_first_string_arg(child).ok_or_else(|| {
                        ConfigError::MissingField(format!("infrastructure for remote '{}'", name))
                    })?;
                }
                "username" => {
                    remote.username = get_first_string_arg(child).unwrap_or_default();
                }
                "token" => {
                    remote.token = get_first_string_arg(child);
                }
                "skip-tls-verify" => {
                    remote.skip_tls_verify = get_first_bool_arg(child).unwrap_or(true);
                }
                _ => {}
            }
        }
    }

    Ok(remote)
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_bool_arg(node: &KdlNode) -> Option<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
}
