//! Transport using libgit2 in-process.
//!
//! No git binary is needed. Repository work runs on the blocking pool and the
//! repository is reopened per operation, so no handle outlives a call.

use async_trait::async_trait;
use git2::{
    CertificateCheckStatus, ConfigLevel, Cred, ErrorCode, IndexAddOption, PushOptions,
    RemoteCallbacks, Repository, RepositoryInitOptions, Signature,
};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use shipyard_config::OutputConfig;
use shipyard_core::{
    Error, GroupUid, IgnoredPaths, Result, ServiceInfoList, Transport, TransportSettings,
};

use crate::diagnostics::interpret_push;
use crate::filter::collect_ignored;
use crate::groupuid::REMOTE_PREFIX;
use crate::version;
use crate::{DEPLOY_REF, REMOTE_NAME, author_identity, staged_path};

/// Transport backed by libgit2.
pub struct EmbeddedTransport {
    output: OutputConfig,
    session: Option<(TransportSettings, CancellationToken)>,
    upload_duration: Duration,
}

impl EmbeddedTransport {
    pub fn new(output: OutputConfig) -> Self {
        Self {
            output,
            session: None,
            upload_duration: Duration::ZERO,
        }
    }

    fn session(&self) -> Result<&(TransportSettings, CancellationToken)> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::Internal("libgit2 transport used before setup".to_string()))
    }

    /// Run `f` on the blocking pool against the work-directory repository.
    async fn with_repo<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Repository, TransportSettings, CancellationToken) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (settings, cancel) = self.session()?.clone();
        let task_cancel = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            let repo = Repository::open(&settings.work_dir).map_err(git_error)?;
            f(repo, settings, task_cancel)
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = task => result.map_err(|e| Error::Internal(format!("git task failed: {}", e)))?,
        }
    }
}

/// Stop libgit2 from reading the operator's global, XDG and system config,
/// which could carry excludes or helpers. Process-wide, so it runs once.
fn isolate_config() -> Result<()> {
    static ISOLATED: OnceLock<std::result::Result<(), String>> = OnceLock::new();
    ISOLATED
        .get_or_init(|| {
            for level in [
                ConfigLevel::System,
                ConfigLevel::XDG,
                ConfigLevel::Global,
                ConfigLevel::ProgramData,
            ] {
                // SAFETY: runs once, before this transport touches any repository.
                unsafe { git2::opts::set_search_path(level, "") }
                    .map_err(|e| e.message().to_string())?;
            }
            Ok(())
        })
        .clone()
        .map_err(|e| Error::Internal(format!("can't isolate git config: {}", e)))
}

fn git_error(e: git2::Error) -> Error {
    Error::CommandFailed(e.message().to_string())
}

/// Pathspec selecting a staged service directory.
fn pathspec(settings: &TransportSettings, service: &shipyard_core::ServiceInfo) -> String {
    let path = staged_path(settings, service);
    if path.as_os_str() == "." {
        "*".to_string()
    } else {
        path.to_string_lossy().replace('\\', "/")
    }
}

/// Prefix each complete sideband line the way git prints it.
fn sideband_lines(raw: &str) -> String {
    raw.split(['\n', '\r'])
        .filter(|line| !line.trim().is_empty())
        .map(|line| format!("{}{}\n", REMOTE_PREFIX, line))
        .collect()
}

#[async_trait]
impl Transport for EmbeddedTransport {
    fn name(&self) -> &'static str {
        "embedded"
    }

    async fn setup(&mut self, cancel: CancellationToken, settings: TransportSettings) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        isolate_config()?;
        info!(libgit2 = %libgit2_version(), "Using embedded transport");
        self.session = Some((settings, cancel));
        Ok(())
    }

    async fn init(&mut self) -> Result<()> {
        let (settings, _) = self.session()?;
        let work_dir = settings.work_dir.clone();
        let (name, email) = author_identity(&settings.context);

        tokio::task::spawn_blocking(move || {
            let mut opts = RepositoryInitOptions::new();
            opts.initial_head("master");
            let repo = Repository::init_opts(&work_dir, &opts).map_err(git_error)?;

            let mut config = repo.config().map_err(git_error)?;
            config.set_str("user.name", &name).map_err(git_error)?;
            config.set_str("user.email", &email).map_err(git_error)?;
            config.set_bool("core.autocrlf", false).map_err(git_error)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Internal(format!("git task failed: {}", e)))?
    }

    async fn process_ignored(&mut self) -> Result<IgnoredPaths> {
        let (settings, _) = self.session()?;
        let source = settings.source_path.clone();

        let ignored = tokio::task::spawn_blocking(move || collect_ignored(&source))
            .await
            .map_err(|e| Error::Internal(format!("ignore task failed: {}", e)))??;

        debug!(count = ignored.len(), "Collected ignored paths");
        Ok(ignored)
    }

    async fn stage(&mut self, services: &ServiceInfoList) -> Result<()> {
        let specs: Vec<String> = {
            let (settings, _) = self.session()?;
            services.iter().map(|s| pathspec(settings, s)).collect()
        };

        self.with_repo(move |repo, _, _| {
            let mut index = repo.index().map_err(git_error)?;
            index
                .add_all(specs.iter().map(String::as_str), IndexAddOption::FORCE, None)
                .map_err(git_error)?;
            index.write().map_err(git_error)?;
            Ok(())
        })
        .await
    }

    async fn commit(&mut self, message: &str) -> Result<String> {
        let message = message.to_string();

        self.with_repo(move |repo, settings, _| {
            let (name, email) = author_identity(&settings.context);
            let signature = Signature::now(&name, &email).map_err(git_error)?;

            let mut index = repo.index().map_err(git_error)?;
            let tree_id = index.write_tree().map_err(git_error)?;
            let tree = repo.find_tree(tree_id).map_err(git_error)?;

            let parent = match repo.head() {
                Ok(head) => Some(head.peel_to_commit().map_err(git_error)?),
                Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => None,
                Err(e) => return Err(git_error(e)),
            };
            let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

            let oid = repo
                .commit(
                    Some("HEAD"),
                    &signature,
                    &signature,
                    &message,
                    &tree,
                    &parents,
                )
                .map_err(git_error)?;
            Ok(oid.to_string())
        })
        .await
    }

    async fn add_remote(&mut self) -> Result<()> {
        self.with_repo(|repo, settings, _| {
            let url = settings.context.git_remote_url(&settings.project_id);
            repo.remote(REMOTE_NAME, &url).map_err(git_error)?;
            Ok(())
        })
        .await
    }

    async fn push(&mut self) -> Result<GroupUid> {
        let verbose = self.output.verbose;
        let started = Instant::now();

        let result = self
            .with_repo(move |repo, settings, cancel| {
                let ctx = &settings.context;
                let head = repo.head().map_err(git_error)?;
                let head_ref = head
                    .name()
                    .ok_or_else(|| Error::Internal("HEAD is not a valid reference".to_string()))?
                    .to_string();
                let refspec = format!("+{}:{}", head_ref, DEPLOY_REF);

                let mut sideband = String::new();
                let mut rejections = Vec::new();
                let mut auth_attempts = 0;

                let push_result = {
                    let mut callbacks = RemoteCallbacks::new();
                    callbacks.credentials(|_url, _username, _allowed| {
                        auth_attempts += 1;
                        if auth_attempts > 1 {
                            return Err(git2::Error::from_str("Authentication failed"));
                        }
                        Cred::userpass_plaintext(&ctx.username, ctx.token.expose())
                    });
                    callbacks.sideband_progress(|data| {
                        let text = String::from_utf8_lossy(data);
                        if verbose {
                            debug!(line = %text.trim_end(), "remote");
                        }
                        sideband.push_str(&text);
                        !cancel.is_cancelled()
                    });
                    callbacks.push_update_reference(|reference, status| {
                        if let Some(status) = status {
                            rejections.push(format!("error: {} rejected: {}", reference, status));
                        }
                        Ok(())
                    });
                    if ctx.skip_tls_verify {
                        callbacks.certificate_check(|_cert, _host| {
                            Ok(CertificateCheckStatus::CertificateOk)
                        });
                    }

                    let mut opts = PushOptions::new();
                    opts.remote_callbacks(callbacks);

                    let mut remote = repo.find_remote(REMOTE_NAME).map_err(git_error)?;
                    remote.push(&[refspec.as_str()], Some(&mut opts))
                };

                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }

                let mut text = sideband_lines(&sideband);
                for line in &rejections {
                    text.push_str(line);
                    text.push('\n');
                }
                if let Err(e) = &push_result {
                    if e.code() == ErrorCode::Auth {
                        return Err(Error::InvalidCredentials);
                    }
                    text.push_str(&format!("fatal: {}\n", e.message()));
                }

                let succeeded = push_result.is_ok() && rejections.is_empty();
                interpret_push(&text, succeeded, &ctx.token)
            })
            .await;

        self.upload_duration = started.elapsed();
        let group_uid = result?;
        info!(group_uid = %group_uid, duration = ?self.upload_duration, "Deployment pushed");
        Ok(group_uid)
    }

    fn upload_duration(&self) -> Duration {
        self.upload_duration
    }

    fn user_agent(&self) -> String {
        version::user_agent(&format!("libgit2/{}", libgit2_version()))
    }
}

fn libgit2_version() -> String {
    let (major, minor, patch) = git2::Version::get().libgit2_version();
    format!("{}.{}.{}", major, minor, patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipyard_core::{AccessToken, PlatformContext, ServiceInfo};
    use std::fs;
    use std::path::Path;

    fn settings(source: &Path, work: &Path) -> TransportSettings {
        TransportSettings {
            context: PlatformContext {
                remote: "cloud".to_string(),
                infrastructure: "shipyard.invalid".to_string(),
                username: "dev@example.com".to_string(),
                token: AccessToken::new("s3cr3t"),
                skip_tls_verify: false,
            },
            project_id: "shop".to_string(),
            source_path: source.to_path_buf(),
            work_dir: work.to_path_buf(),
        }
    }

    async fn ready(source: &Path, work: &Path) -> EmbeddedTransport {
        let mut transport = EmbeddedTransport::new(OutputConfig::default());
        transport
            .setup(CancellationToken::new(), settings(source, work))
            .await
            .unwrap();
        transport.init().await.unwrap();
        transport
    }

    #[test]
    fn test_sideband_lines() {
        let raw = "Resolving deltas\rdeploy: [{\"groupUid\": \"g\"}]\n\n";
        assert_eq!(
            sideband_lines(raw),
            "remote: Resolving deltas\nremote: deploy: [{\"groupUid\": \"g\"}]\n"
        );
    }

    #[test]
    fn test_user_agent() {
        let transport = EmbeddedTransport::new(OutputConfig::default());
        assert!(transport.user_agent().contains("(libgit2/"));
    }

    #[tokio::test]
    async fn test_setup_honors_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut transport = EmbeddedTransport::new(OutputConfig::default());
        assert!(matches!(
            transport
                .setup(cancel, settings(dir.path(), dir.path()))
                .await,
            Err(Error::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_init_configures_identity() {
        let source = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        ready(source.path(), work.path()).await;

        let repo = Repository::open(work.path()).unwrap();
        let config = repo.config().unwrap();
        assert_eq!(config.get_string("user.email").unwrap(), "dev@example.com");
        assert!(!config.get_bool("core.autocrlf").unwrap());
    }

    #[tokio::test]
    async fn test_process_ignored() {
        let source = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        fs::write(source.path().join(".gitignore"), "node_modules/\n").unwrap();
        fs::create_dir_all(source.path().join("web/node_modules/x")).unwrap();

        let mut transport = ready(source.path(), work.path()).await;
        let ignored = transport.process_ignored().await.unwrap();
        assert!(ignored.contains(&source.path().join("web/node_modules")));
    }

    #[tokio::test]
    async fn test_stage_and_commit() {
        let source = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        fs::create_dir_all(work.path().join("web")).unwrap();
        fs::write(work.path().join("web/shipyard.json"), "{}").unwrap();
        fs::create_dir_all(work.path().join("api")).unwrap();
        fs::write(work.path().join("api/main.go"), "package main").unwrap();

        let mut transport = ready(source.path(), work.path()).await;
        let services = ServiceInfoList::new(vec![ServiceInfo::new(
            "web",
            source.path().join("web"),
        )]);
        transport.stage(&services).await.unwrap();
        let first = transport.commit("Deployment").await.unwrap();

        let repo = Repository::open(work.path()).unwrap();
        let commit = repo.find_commit(git2::Oid::from_str(&first).unwrap()).unwrap();
        let tree = commit.tree().unwrap();
        assert!(tree.get_path(Path::new("web/shipyard.json")).is_ok());
        assert!(tree.get_path(Path::new("api/main.go")).is_err());

        // An unchanged tree still commits.
        let second = transport.commit("Deployment").await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_stage_ignores_exclude_rules() {
        let source = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        fs::create_dir_all(work.path().join("web")).unwrap();
        fs::write(work.path().join("web/shipyard.json"), "{}").unwrap();
        fs::write(work.path().join("web/app.env"), "PORT=80").unwrap();

        let mut transport = ready(source.path(), work.path()).await;
        // The package was filtered while copying; no later rule may drop files.
        fs::create_dir_all(work.path().join(".git/info")).unwrap();
        fs::write(work.path().join(".git/info/exclude"), "*.env\n").unwrap();
        fs::write(work.path().join("web/.gitignore"), "*.env\n").unwrap();

        let services = ServiceInfoList::new(vec![ServiceInfo::new(
            "web",
            source.path().join("web"),
        )]);
        transport.stage(&services).await.unwrap();
        let hash = transport.commit("Deployment").await.unwrap();

        let repo = Repository::open(work.path()).unwrap();
        let tree = repo
            .find_commit(git2::Oid::from_str(&hash).unwrap())
            .unwrap()
            .tree()
            .unwrap();
        assert!(tree.get_path(Path::new("web/app.env")).is_ok());
    }

    #[tokio::test]
    async fn test_setup_isolates_global_config() {
        let dir = tempfile::tempdir().unwrap();
        ready(dir.path(), dir.path()).await;

        let config = git2::Config::open_default().unwrap();
        assert!(config.open_level(ConfigLevel::Global).is_err());
    }

    #[tokio::test]
    async fn test_add_remote() {
        let source = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let mut transport = ready(source.path(), work.path()).await;
        transport.add_remote().await.unwrap();

        let repo = Repository::open(work.path()).unwrap();
        let remote = repo.find_remote(REMOTE_NAME).unwrap();
        assert_eq!(remote.url(), Some("https://git.shipyard.invalid/shop.git"));
    }
}
