//! Transport driving the `git` binary.
//!
//! Every operation runs one git process in an isolated environment: a
//! throwaway home directory, no system configuration and no terminal
//! prompts, so the operator's own git setup cannot interfere.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shipyard_config::OutputConfig;
use shipyard_core::{
    Error, GroupUid, IgnoredPaths, Result, ServiceInfoList, Transport, TransportSettings,
};

use crate::credential::{self, TOKEN_ENV, USERNAME_ENV};
use crate::diagnostics::interpret_push;
use crate::version::{self, CredentialStrategy, GitVersion, MINIMUM_GIT};
use crate::{DEPLOY_REF, REMOTE_NAME, author_identity, staged_path};

/// State established by `setup`.
struct Session {
    git: PathBuf,
    version: GitVersion,
    strategy: CredentialStrategy,
    home: TempDir,
    settings: TransportSettings,
    cancel: CancellationToken,
}

/// Transport that shells out to git.
pub struct ExternalTransport {
    output: OutputConfig,
    session: Option<Session>,
    upload_duration: Duration,
}

impl ExternalTransport {
    pub fn new(output: OutputConfig) -> Self {
        Self {
            output,
            session: None,
            upload_duration: Duration::ZERO,
        }
    }

    /// Credential strategy chosen during setup.
    pub fn credential_strategy(&self) -> Option<CredentialStrategy> {
        self.session.as_ref().map(|s| s.strategy)
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::Internal("git transport used before setup".to_string()))
    }

    /// Run git in the work directory.
    async fn git(&self, args: &[&str], envs: &[(&'static str, String)]) -> Result<Output> {
        let session = self.session()?;
        let settings = &session.settings;

        debug!(
            args = %settings.context.token.redact(&args.join(" ")),
            dir = %settings.work_dir.display(),
            "Running git"
        );

        let mut cmd = Command::new(&session.git);
        cmd.args(args)
            .current_dir(&settings.work_dir)
            .envs(base_env(session.home.path(), settings, self.user_agent()))
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .env_remove("GIT_INDEX_FILE")
            .env_remove("GIT_ASKPASS")
            .env_remove("SSH_ASKPASS")
            .envs(envs.iter().map(|(key, value)| (*key, value.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Dropping the output future kills the child.
        tokio::select! {
            biased;
            _ = session.cancel.cancelled() => Err(Error::Cancelled),
            output = cmd.output() => Ok(output?),
        }
    }

    /// Run git and fail on a non-zero exit, returning stdout.
    async fn git_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.git(args, &[]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let token = &self.session()?.settings.context.token;
            return Err(Error::CommandFailed(format!(
                "git {}: {}",
                args.iter().find(|a| !a.starts_with('-')).unwrap_or(&""),
                token.redact(stderr.trim())
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

async fn git_version(git: &Path, cancel: &CancellationToken) -> Result<GitVersion> {
    let mut cmd = Command::new(git);
    cmd.arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        output = cmd.output() => output?,
    };

    let text = String::from_utf8_lossy(&output.stdout);
    GitVersion::parse(&text).ok_or_else(|| {
        Error::CommandFailed(format!("unrecognized git version: {}", text.trim()))
    })
}

/// Environment of every git process: a sandbox home, no system config, no
/// prompts, and TLS verification off when the context asks for it.
fn base_env(
    home: &Path,
    settings: &TransportSettings,
    user_agent: String,
) -> Vec<(&'static str, String)> {
    let home = home.display().to_string();
    let mut env = vec![
        ("HOME", home.clone()),
        ("USERPROFILE", home.clone()),
        ("XDG_CONFIG_HOME", home),
        ("GIT_CONFIG_NOSYSTEM", "1".to_string()),
        ("GIT_TERMINAL_PROMPT", "0".to_string()),
        ("GIT_HTTP_USER_AGENT", user_agent),
        ("LC_ALL", "C".to_string()),
    ];
    if settings.context.skip_tls_verify {
        env.push(("GIT_SSL_NO_VERIFY", "true".to_string()));
    }
    env
}

/// Where a push goes and what extra environment only the push process gets.
#[derive(Debug, PartialEq, Eq)]
struct PushPlan {
    target: String,
    envs: Vec<(&'static str, String)>,
}

fn push_plan(strategy: CredentialStrategy, settings: &TransportSettings) -> PushPlan {
    let ctx = &settings.context;
    match strategy {
        CredentialStrategy::Helper => PushPlan {
            target: REMOTE_NAME.to_string(),
            envs: vec![
                (USERNAME_ENV, ctx.username.clone()),
                (TOKEN_ENV, ctx.token.expose().to_string()),
            ],
        },
        CredentialStrategy::EmbeddedUrl => PushPlan {
            target: ctx.git_remote_url_with_credentials(&settings.project_id),
            envs: Vec::new(),
        },
    }
}

/// Parse `git status --porcelain -z` output into ignored paths under `root`.
fn parse_ignored(status: &str, root: &Path) -> IgnoredPaths {
    status
        .split('\0')
        .filter_map(|entry| entry.strip_prefix("!! "))
        .map(|path| root.join(path.trim_end_matches('/')))
        .collect()
}

#[async_trait]
impl Transport for ExternalTransport {
    fn name(&self) -> &'static str {
        "external"
    }

    async fn setup(&mut self, cancel: CancellationToken, settings: TransportSettings) -> Result<()> {
        let git = which::which("git").map_err(|_| Error::ToolNotFound("git".to_string()))?;
        let version = git_version(&git, &cancel).await?;
        if version < MINIMUM_GIT {
            return Err(Error::ToolTooOld {
                tool: "git".to_string(),
                found: version.to_string(),
                required: MINIMUM_GIT.to_string(),
            });
        }

        let strategy = CredentialStrategy::detect(version);
        if strategy == CredentialStrategy::EmbeddedUrl {
            warn!(
                version = %version,
                "This git release cannot use credential helpers, passing the token in the remote URL"
            );
        }

        let home = tempfile::Builder::new()
            .prefix("shipyard-git-home")
            .tempdir()?;

        info!(git = %git.display(), version = %version, "Using git transport");

        self.session = Some(Session {
            git,
            version,
            strategy,
            home,
            settings,
            cancel,
        });
        Ok(())
    }

    async fn init(&mut self) -> Result<()> {
        let (name, email) = author_identity(&self.session()?.settings.context);

        self.git_checked(&["init", "--quiet"]).await?;
        self.git_checked(&["config", "user.name", &name]).await?;
        self.git_checked(&["config", "user.email", &email]).await?;
        self.git_checked(&["config", "core.autocrlf", "false"]).await?;
        self.git_checked(&["config", "core.safecrlf", "false"]).await?;
        Ok(())
    }

    async fn process_ignored(&mut self) -> Result<IgnoredPaths> {
        let settings = &self.session()?.settings;
        let git_dir = format!("--git-dir={}", settings.work_dir.join(".git").display());
        let work_tree = format!("--work-tree={}", settings.source_path.display());
        let source = settings.source_path.clone();

        let status = self
            .git_checked(&[
                &git_dir,
                &work_tree,
                "status",
                "--ignored",
                "--untracked-files=all",
                "--porcelain",
                "-z",
            ])
            .await?;

        let ignored = parse_ignored(&status, &source);
        debug!(count = ignored.len(), "Collected ignored paths");
        Ok(ignored)
    }

    async fn stage(&mut self, services: &ServiceInfoList) -> Result<()> {
        let paths: Vec<String> = {
            let settings = &self.session()?.settings;
            services
                .iter()
                .map(|service| staged_path(settings, service).display().to_string())
                .collect()
        };

        for path in &paths {
            self.git_checked(&["add", "--all", "--force", "--", path])
                .await?;
        }
        Ok(())
    }

    async fn commit(&mut self, message: &str) -> Result<String> {
        self.git_checked(&[
            "commit",
            "--quiet",
            "--allow-empty",
            "--no-verify",
            "--no-gpg-sign",
            "-m",
            message,
        ])
        .await?;

        let hash = self.git_checked(&["rev-parse", "HEAD"]).await?;
        Ok(hash.trim().to_string())
    }

    async fn add_remote(&mut self) -> Result<()> {
        let (url, strategy) = {
            let session = self.session()?;
            let settings = &session.settings;
            (
                settings.context.git_remote_url(&settings.project_id),
                session.strategy,
            )
        };

        self.git_checked(&["remote", "add", REMOTE_NAME, &url])
            .await?;

        if strategy == CredentialStrategy::Helper {
            let exe = std::env::current_exe()?;
            let helper = credential::helper_config_value(&exe);
            // Clear inherited helpers first, then install ours.
            self.git_checked(&["config", "--add", "credential.helper", ""])
                .await?;
            self.git_checked(&["config", "--add", "credential.helper", &helper])
                .await?;
        }
        Ok(())
    }

    async fn push(&mut self) -> Result<GroupUid> {
        let (plan, token) = {
            let session = self.session()?;
            (
                push_plan(session.strategy, &session.settings),
                session.settings.context.token.clone(),
            )
        };
        let refspec = format!("HEAD:{}", DEPLOY_REF);

        let started = Instant::now();
        let output = self
            .git(&["push", "--force", &plan.target, &refspec], &plan.envs)
            .await;
        self.upload_duration = started.elapsed();
        let output = output?;

        let text = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        if self.output.verbose {
            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                debug!(line = %token.redact(line), "git push");
            }
        }

        let group_uid = interpret_push(&text, output.status.success(), &token)?;
        info!(group_uid = %group_uid, duration = ?self.upload_duration, "Deployment pushed");
        Ok(group_uid)
    }

    fn upload_duration(&self) -> Duration {
        self.upload_duration
    }

    fn user_agent(&self) -> String {
        let engine = match &self.session {
            Some(session) => format!("git/{}", session.version),
            None => "git/unknown".to_string(),
        };
        version::user_agent(&engine)
    }
}
