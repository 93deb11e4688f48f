//! Shipyard CLI tool.

use clap::{Parser, Subcommand};
use shipyard_config::TransportKind;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod render;

#[derive(Parser)]
#[command(name = "shipyard")]
#[command(about = "Deploy services to the Shipyard platform", long_about = None)]
struct Cli {
    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the services of a project
    Deploy(DeployArgs),
    /// Git credential helper used during pushes
    #[command(hide = true)]
    CredentialHelper {
        /// Operation requested by git (get, store or erase)
        operation: String,
    },
}

#[derive(clap::Args)]
pub struct DeployArgs {
    /// Project directory
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Project to deploy to
    #[arg(short, long, env = "SHIPYARD_PROJECT")]
    pub project: String,

    /// Deploy only this service
    #[arg(short, long)]
    pub service: Option<String>,

    /// Region written into every service manifest
    #[arg(long)]
    pub region: Option<String>,

    /// Image written into every service manifest
    #[arg(long)]
    pub image: Option<String>,

    /// JSON metadata recorded with the deployment
    #[arg(long)]
    pub metadata: Option<String>,

    /// Stop once the builds finish
    #[arg(long)]
    pub only_build: bool,

    /// Only print the outcome
    #[arg(short, long)]
    pub quiet: bool,

    /// Don't wait for the deployment, print its group UID
    #[arg(long)]
    pub skip_progress: bool,

    /// Configured remote to use
    #[arg(long, env = "SHIPYARD_REMOTE")]
    pub remote: Option<String>,

    /// Infrastructure domain
    #[arg(long, env = "SHIPYARD_INFRASTRUCTURE")]
    pub infrastructure: Option<String>,

    #[arg(long, env = "SHIPYARD_USERNAME")]
    pub username: Option<String>,

    /// Access token
    #[arg(long, env = "SHIPYARD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, env = "SHIPYARD_SKIP_TLS_VERIFY")]
    pub skip_tls_verify: bool,

    /// Transport used for the upload (external or embedded)
    #[arg(long, env = "SHIPYARD_TRANSPORT")]
    pub transport: Option<TransportKind>,

    /// Configuration file
    #[arg(long, env = "SHIPYARD_CONFIG")]
    pub config: Option<PathBuf>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("SHIPYARD_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Deploy(args) => {
            init_tracing(cli.verbose);
            commands::deploy::run(args, cli.verbose).await?;
        }
        // Git reads the helper's stdout, so nothing else may be printed.
        Commands::CredentialHelper { operation } => {
            commands::credential::run(&operation)?;
        }
    }

    Ok(())
}
