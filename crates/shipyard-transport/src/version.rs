//! Git version parsing and credential capability checks.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static VERSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"git version (\d+)\.(\d+)(?:\.(\d+))?").unwrap());

/// Oldest git release the external transport supports.
pub const MINIMUM_GIT: GitVersion = GitVersion::new(2, 0, 0);

/// Git releases on Windows whose credential-helper support loses the helper's
/// answer, making authenticated pushes fail.
const HELPER_DEFECT_FROM: GitVersion = GitVersion::new(2, 12, 0);
const HELPER_DEFECT_UNTIL: GitVersion = GitVersion::new(2, 14, 2);

/// A `major.minor.patch` git version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GitVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl GitVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the output of `git --version`.
    ///
    /// Vendor suffixes such as `.windows.1` or ` (Apple Git-143)` are ignored.
    pub fn parse(output: &str) -> Option<Self> {
        let caps = VERSION_REGEX.captures(output)?;
        let part = |i: usize| {
            caps.get(i)
                .map(|m| m.as_str().parse::<u32>())
                .unwrap_or(Ok(0))
                .ok()
        };
        Some(Self::new(part(1)?, part(2)?, part(3)?))
    }
}

impl fmt::Display for GitVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// How the external transport hands the token to git during a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStrategy {
    /// Install this binary as the repository's credential helper and pass the
    /// token through the push process environment.
    Helper,
    /// Embed the token in the remote URL for the push. The token is visible in
    /// the process arguments for the duration of the call.
    EmbeddedUrl,
}

impl CredentialStrategy {
    /// Pick the strategy for a git version running on `os`.
    pub fn for_environment(os: &str, version: GitVersion) -> Self {
        if os == "windows" && version >= HELPER_DEFECT_FROM && version < HELPER_DEFECT_UNTIL {
            CredentialStrategy::EmbeddedUrl
        } else {
            CredentialStrategy::Helper
        }
    }

    /// Strategy for the git version on the current platform.
    pub fn detect(version: GitVersion) -> Self {
        Self::for_environment(std::env::consts::OS, version)
    }
}

/// User agent for a transport built on `engine` (e.g. `git/2.39.2`).
pub fn user_agent(engine: &str) -> String {
    format!(
        "shipyard/{} ({}; {}/{})",
        shipyard_core::CLIENT_VERSION,
        engine,
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_versions() {
        assert_eq!(
            GitVersion::parse("git version 2.39.2\n"),
            Some(GitVersion::new(2, 39, 2))
        );
        assert_eq!(
            GitVersion::parse("git version 2.13.0.windows.1"),
            Some(GitVersion::new(2, 13, 0))
        );
        assert_eq!(
            GitVersion::parse("git version 2.39.3 (Apple Git-146)"),
            Some(GitVersion::new(2, 39, 3))
        );
        assert_eq!(
            GitVersion::parse("git version 1.8"),
            Some(GitVersion::new(1, 8, 0))
        );
        assert_eq!(GitVersion::parse("hg version 6.1"), None);
    }

    #[test]
    fn test_minimum() {
        assert!(GitVersion::new(1, 9, 5) < MINIMUM_GIT);
        assert!(GitVersion::new(2, 0, 0) >= MINIMUM_GIT);
        assert_eq!(MINIMUM_GIT.to_string(), "2.0.0");
    }

    #[test]
    fn test_credential_strategy_defect_window() {
        use CredentialStrategy::*;

        let cases = [
            ("windows", GitVersion::new(2, 11, 9), Helper),
            ("windows", GitVersion::new(2, 12, 0), EmbeddedUrl),
            ("windows", GitVersion::new(2, 13, 0), EmbeddedUrl),
            ("windows", GitVersion::new(2, 14, 1), EmbeddedUrl),
            ("windows", GitVersion::new(2, 14, 2), Helper),
            ("linux", GitVersion::new(2, 13, 0), Helper),
            ("macos", GitVersion::new(2, 12, 0), Helper),
        ];

        for (os, version, expected) in cases {
            assert_eq!(
                CredentialStrategy::for_environment(os, version),
                expected,
                "{} git {}",
                os,
                version
            );
        }
    }

    #[test]
    fn test_user_agent() {
        let ua = user_agent("git/2.39.2");
        assert!(ua.starts_with("shipyard/"));
        assert!(ua.contains("(git/2.39.2; "));
        assert!(ua.ends_with(&format!(
            "{}/{})",
            std::env::consts::OS,
            std::env::consts::ARCH
        )));
    }
}
