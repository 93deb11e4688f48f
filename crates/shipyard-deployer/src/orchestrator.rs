//! Deploy orchestrator - drives a transport through one deployment.

use chrono::Utc;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shipyard_core::{
    GroupUid, PlatformContext, Provenance, ServiceInfoList, Transport, TransportSettings,
};

use crate::discovery::{Discovery, discover};
use crate::message::commit_message;
use crate::package::{Overrides, stage_package};
use crate::{DeployError, DeployResult};

/// Parameters of one deploy invocation.
#[derive(Debug, Clone, Default)]
pub struct DeployParams {
    pub project_id: String,
    /// Deploy only this service.
    pub service_id: Option<String>,
    pub region: Option<String>,
    /// Image override written into every staged manifest.
    pub image: Option<String>,
    /// Free-form metadata recorded with the deployment.
    pub metadata: Option<serde_json::Value>,
    /// Stop following once builds finish.
    pub only_build: bool,
    /// Don't follow the deployment at all.
    pub skip_progress: bool,
}

/// How far the caller should follow a pushed deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Follow {
    Nothing,
    Builds,
    Deploys,
}

impl DeployParams {
    pub fn follow(&self) -> Follow {
        if self.skip_progress {
            Follow::Nothing
        } else if self.only_build {
            Follow::Builds
        } else {
            Follow::Deploys
        }
    }
}

/// Result of a completed push.
#[derive(Debug, Clone)]
pub struct DeployReceipt {
    pub group_uid: GroupUid,
    pub commit: String,
    /// Services included in the deployment.
    pub services: ServiceInfoList,
    pub upload_duration: Duration,
    pub user_agent: String,
    pub follow: Follow,
}

/// Runs deployments through a transport chosen at startup.
pub struct Deployer {
    transport: Box<dyn Transport>,
    context: PlatformContext,
}

impl Deployer {
    pub fn new(transport: Box<dyn Transport>, context: PlatformContext) -> Self {
        Self { transport, context }
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Stage, commit and push the services under `source`.
    ///
    /// The staging directory is removed when this returns, whatever the outcome.
    pub async fn deploy(
        &mut self,
        cancel: &CancellationToken,
        params: DeployParams,
        source: &Path,
        services: &ServiceInfoList,
    ) -> DeployResult<DeployReceipt> {
        let follow = params.follow();
        let services = match &params.service_id {
            Some(id) => services.only(id)?,
            None => services.clone(),
        };
        if services.is_empty() {
            return Err(DeployError::NoServices(source.display().to_string()));
        }

        let staging = tempfile::Builder::new()
            .prefix("shipyard-deploy")
            .tempdir()?;

        info!(
            project = %params.project_id,
            services = ?services.ids(),
            transport = self.transport.name(),
            "Starting deployment"
        );

        let settings = TransportSettings {
            context: self.context.clone(),
            project_id: params.project_id.clone(),
            source_path: source.to_path_buf(),
            work_dir: staging.path().to_path_buf(),
        };

        self.transport.setup(cancel.clone(), settings).await?;
        self.transport.init().await?;
        let ignored = self.transport.process_ignored().await?;

        let discovery = match discover(source, &services).await {
            Ok(discovery) => discovery,
            Err(e) => {
                warn!(error = %e, "Can't read repository information, deploying without it");
                Discovery::default()
            }
        };

        let overrides = Overrides {
            image: params.image.as_deref(),
            region: params.region.as_deref(),
        };
        stage_package(source, staging.path(), &services, &ignored, &overrides).await?;
        self.transport.stage(&services).await?;

        let mut provenance = Provenance::new(Utc::now());
        provenance.repos = discovery.repos;
        provenance.repoless = discovery.repoless;
        provenance.metadata = params.metadata;
        let message = commit_message(&provenance)?;

        let commit = self.transport.commit(&message).await?;
        debug!(commit = %commit, "Created deployment commit");

        self.transport.add_remote().await?;
        let group_uid = self.transport.push().await?;

        info!(
            group_uid = %group_uid,
            duration = ?self.transport.upload_duration(),
            follow = ?follow,
            "Deployment accepted"
        );

        Ok(DeployReceipt {
            group_uid,
            commit,
            services,
            upload_duration: self.transport.upload_duration(),
            user_agent: self.transport.user_agent(),
            follow,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shipyard_core::{AccessToken, Error, IgnoredPaths, Result, ServiceInfo};
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    /// Transport recording the calls it receives.
    #[derive(Default)]
    struct RecordingTransport {
        calls: Arc<Mutex<Vec<String>>>,
        work_dir: Arc<Mutex<Option<PathBuf>>>,
        staged_files: Arc<Mutex<Vec<String>>>,
        message: Arc<Mutex<String>>,
        ignored: IgnoredPaths,
        fail_push: bool,
    }

    impl RecordingTransport {
        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                out.push(path.strip_prefix(root).unwrap().display().to_string());
            }
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn setup(&mut self, _cancel: CancellationToken, settings: TransportSettings) -> Result<()> {
            self.record("setup");
            *self.work_dir.lock().unwrap() = Some(settings.work_dir);
            Ok(())
        }

        async fn init(&mut self) -> Result<()> {
            self.record("init");
            Ok(())
        }

        async fn process_ignored(&mut self) -> Result<IgnoredPaths> {
            self.record("process_ignored");
            Ok(self.ignored.clone())
        }

        async fn stage(&mut self, _services: &ServiceInfoList) -> Result<()> {
            self.record("stage");
            let dir = self.work_dir.lock().unwrap().clone().unwrap();
            let mut files = Vec::new();
            walk(&dir, &dir, &mut files);
            files.sort();
            *self.staged_files.lock().unwrap() = files;
            Ok(())
        }

        async fn commit(&mut self, message: &str) -> Result<String> {
            self.record("commit");
            *self.message.lock().unwrap() = message.to_string();
            Ok("c0ffee".to_string())
        }

        async fn add_remote(&mut self) -> Result<()> {
            self.record("add_remote");
            Ok(())
        }

        async fn push(&mut self) -> Result<GroupUid> {
            self.record("push");
            if self.fail_push {
                return Err(Error::InvalidCredentials);
            }
            Ok(GroupUid::new("g-42"))
        }

        fn upload_duration(&self) -> Duration {
            Duration::from_millis(5)
        }

        fn user_agent(&self) -> String {
            "shipyard/test".to_string()
        }
    }

    fn context() -> PlatformContext {
        PlatformContext {
            remote: "cloud".to_string(),
            infrastructure: "shipyard.invalid".to_string(),
            username: "dev@example.com".to_string(),
            token: AccessToken::new("t"),
            skip_tls_verify: false,
        }
    }

    fn project() -> (tempfile::TempDir, ServiceInfoList) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for svc in ["web", "api"] {
            fs::create_dir_all(root.join(svc)).unwrap();
            fs::write(root.join(svc).join("shipyard.json"), "{}").unwrap();
            fs::write(root.join(svc).join("main.go"), "package main").unwrap();
        }
        fs::write(root.join("web/secret.env"), "").unwrap();
        let services = ServiceInfoList::new(vec![
            ServiceInfo::new("web", root.join("web")),
            ServiceInfo::new("api", root.join("api")),
        ]);
        (dir, services)
    }

    #[tokio::test]
    async fn test_deploy_runs_transport_in_order() {
        let (dir, services) = project();
        let mut ignored = IgnoredPaths::new();
        ignored.insert(dir.path().join("web/secret.env"));

        let transport = RecordingTransport {
            ignored,
            ..Default::default()
        };
        let calls = transport.calls.clone();
        let staged = transport.staged_files.clone();
        let message = transport.message.clone();
        let work_dir = transport.work_dir.clone();

        let mut deployer = Deployer::new(Box::new(transport), context());
        let params = DeployParams {
            project_id: "shop".to_string(),
            metadata: Some(serde_json::json!({"ticket": "OPS-1"})),
            ..Default::default()
        };
        let receipt = deployer
            .deploy(&CancellationToken::new(), params, dir.path(), &services)
            .await
            .unwrap();

        assert_eq!(receipt.group_uid.as_str(), "g-42");
        assert_eq!(receipt.commit, "c0ffee");
        assert_eq!(receipt.follow, Follow::Deploys);
        assert_eq!(receipt.services.ids(), vec!["api", "web"]);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "setup",
                "init",
                "process_ignored",
                "stage",
                "commit",
                "add_remote",
                "push"
            ]
        );

        let staged = staged.lock().unwrap().clone();
        let expected: Vec<String> = [
            "api/main.go",
            "api/shipyard.json",
            "web/main.go",
            "web/shipyard.json",
        ]
        .iter()
        .map(|p| Path::new(p).display().to_string())
        .collect();
        assert_eq!(staged, expected);

        let message = message.lock().unwrap().clone();
        let (_, body) = message.split_once("\n\n").unwrap();
        let provenance: Provenance = serde_json::from_str(body).unwrap();
        assert_eq!(provenance.repoless, vec!["api", "web"]);
        assert_eq!(provenance.metadata.unwrap()["ticket"], "OPS-1");

        // Staging is gone once the deploy returns.
        let work_dir = work_dir.lock().unwrap().clone().unwrap();
        assert!(!work_dir.exists());
    }

    #[tokio::test]
    async fn test_deploy_single_service() {
        let (dir, services) = project();
        let transport = RecordingTransport::default();
        let staged = transport.staged_files.clone();

        let mut deployer = Deployer::new(Box::new(transport), context());
        let params = DeployParams {
            project_id: "shop".to_string(),
            service_id: Some("api".to_string()),
            ..Default::default()
        };
        let receipt = deployer
            .deploy(&CancellationToken::new(), params, dir.path(), &services)
            .await
            .unwrap();

        assert_eq!(receipt.services.ids(), vec!["api"]);
        assert!(staged.lock().unwrap().iter().all(|f| f.starts_with("api")));
    }

    #[test]
    fn test_follow_from_flags() {
        let mut params = DeployParams::default();
        assert_eq!(params.follow(), Follow::Deploys);
        params.only_build = true;
        assert_eq!(params.follow(), Follow::Builds);
        params.skip_progress = true;
        assert_eq!(params.follow(), Follow::Nothing);
    }

    #[tokio::test]
    async fn test_receipt_carries_follow() {
        let (dir, services) = project();
        let mut deployer = Deployer::new(Box::new(RecordingTransport::default()), context());
        let params = DeployParams {
            project_id: "shop".to_string(),
            only_build: true,
            ..Default::default()
        };
        let receipt = deployer
            .deploy(&CancellationToken::new(), params, dir.path(), &services)
            .await
            .unwrap();
        assert_eq!(receipt.follow, Follow::Builds);
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let (dir, services) = project();
        let mut deployer = Deployer::new(Box::new(RecordingTransport::default()), context());
        let params = DeployParams {
            project_id: "shop".to_string(),
            service_id: Some("worker".to_string()),
            ..Default::default()
        };
        let result = deployer
            .deploy(&CancellationToken::new(), params, dir.path(), &services)
            .await;
        assert!(matches!(
            result,
            Err(DeployError::Transport(Error::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_push_failure_removes_staging() {
        let (dir, services) = project();
        let transport = RecordingTransport {
            fail_push: true,
            ..Default::default()
        };
        let work_dir = transport.work_dir.clone();

        let mut deployer = Deployer::new(Box::new(transport), context());
        let params = DeployParams {
            project_id: "shop".to_string(),
            ..Default::default()
        };
        let result = deployer
            .deploy(&CancellationToken::new(), params, dir.path(), &services)
            .await;

        assert!(matches!(
            result,
            Err(DeployError::Transport(Error::InvalidCredentials))
        ));
        let work_dir = work_dir.lock().unwrap().clone().unwrap();
        assert!(!work_dir.exists());
    }
}
