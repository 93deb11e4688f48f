//! `shipyard deploy` - push a project and follow its deployment.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use shipyard_config::{Config, OutputConfig, Overrides, TransportKind};
use shipyard_core::Transport;
use shipyard_deployer::{DeployParams, Deployer, Follow, find_services};
use shipyard_transport::{EmbeddedTransport, ExternalTransport};
use shipyard_watch::{ActivitiesClient, FeedbackWatch, WatchMode, WatchOptions};

use crate::DeployArgs;
use crate::render::Renderer;

pub async fn run(args: DeployArgs, verbose: bool) -> Result<()> {
    let config_path = args.config.clone().or_else(Config::default_path);
    let config = match &config_path {
        Some(path) => Config::load(path)
            .await
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => Config::default(),
    };

    let overrides = Overrides {
        remote: args.remote.clone(),
        infrastructure: args.infrastructure.clone(),
        username: args.username.clone(),
        token: args.token.clone(),
        skip_tls_verify: args.skip_tls_verify.then_some(true),
        transport: args.transport,
    };
    let resolved = config.resolve(&overrides)?;

    let metadata = args
        .metadata
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("--metadata must be valid JSON")?;

    let source = tokio::fs::canonicalize(&args.path)
        .await
        .with_context(|| format!("Failed to resolve project directory: {}", args.path.display()))?;
    let services = find_services(&source).await?;
    debug!(path = %source.display(), services = ?services.ids(), "Found services");

    let output = OutputConfig {
        verbose,
        quiet: args.quiet,
    };
    let transport: Box<dyn Transport> = match resolved.transport {
        TransportKind::External => Box::new(ExternalTransport::new(output)),
        TransportKind::Embedded => Box::new(EmbeddedTransport::new(output)),
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let context = resolved.context;
    let renderer = Renderer::new(output);
    let mut deployer = Deployer::new(transport, context.clone());
    let params = DeployParams {
        project_id: args.project.clone(),
        service_id: args.service.clone(),
        region: args.region.clone(),
        image: args.image.clone(),
        metadata,
        only_build: args.only_build,
        skip_progress: args.skip_progress,
    };

    renderer.progress(&format!(
        "Uploading {} ({} transport)",
        args.project,
        deployer.transport_name()
    ));
    let receipt = deployer.deploy(&cancel, params, &source, &services).await?;

    let mode = match receipt.follow {
        Follow::Nothing => {
            println!("{}", receipt.group_uid);
            return Ok(());
        }
        Follow::Builds => WatchMode::BuildOnly,
        Follow::Deploys => WatchMode::Full,
    };
    renderer.progress(&format!(
        "Upload took {:.1}s",
        receipt.upload_duration.as_secs_f64()
    ));

    let client = ActivitiesClient::new(&context, &receipt.user_agent)?;
    let watch = FeedbackWatch::new(
        Arc::new(client),
        args.project.clone(),
        receipt.group_uid.clone(),
        receipt.services.ids(),
        WatchOptions {
            mode,
            ..Default::default()
        },
    );

    let (mut rx, handle) = watch.start(cancel.clone());
    while let Some(event) = rx.recv().await {
        renderer.event(&event);
    }
    handle.await.context("Deployment watch task failed")??;

    match mode {
        WatchMode::Full => renderer.deployed(&context, &args.project, &receipt.services),
        WatchMode::BuildOnly => println!("✓ Built {}", args.project),
    }
    Ok(())
}
