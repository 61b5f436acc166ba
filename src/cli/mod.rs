//! # Command Line Interface
//!
//! Operator commands around a deploy: `begin` starts a rotation, `prepare` runs before
//! each deploy and emits the manifest overrides, `complete` runs after a successful
//! deploy, and `status` shows where the rotation stands.

pub mod config;
pub mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credhub::HttpCredentialStore;
use crate::observability::init_logging;
use crate::rotation::{RotationOrchestrator, RotationPhase};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "certrotate")]
#[command(about = "Progressive CA rotation for Credhub-backed deployments")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Credential prefix of the deployment (overrides CERTROTATE_PREFIX)
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    /// Credhub base URL (overrides CERTROTATE_CREDHUB_URL / CREDHUB_SERVER)
    #[arg(long, global = true)]
    pub credhub_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply the current rotation step and emit overrides for the next deploy
    Prepare {
        /// Write the overrides to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,
    },

    /// Record a successful deploy and advance the rotation
    Complete,

    /// Show the current rotation step
    Status,

    /// Start a certificate rotation
    Begin {
        /// Restart even if a rotation is already in progress
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    fn overrides(&self) -> config::Overrides {
        config::Overrides {
            prefix: self.prefix.clone(),
            credhub_url: self.credhub_url.clone(),
            timeout: self.timeout,
        }
    }
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);
    debug!(app_name = crate::APP_NAME, version = crate::VERSION, "Starting");

    let settings = config::resolve_config(&cli.overrides())?;
    let store = HttpCredentialStore::new(&settings.credhub)
        .context("Failed to create Credhub client")?;
    let orchestrator = RotationOrchestrator::from_config(Arc::new(store), &settings);

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_interrupt(cancel.clone()));

    let result = run_command(cli.command, &orchestrator, &cancel).await;
    watcher.abort();
    result
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("Interrupt received, cancelling");
            cancel.cancel();
        }
        Err(e) => warn!(error = %e, "Failed to listen for interrupt signal"),
    }
}

async fn run_command(
    command: Commands,
    orchestrator: &RotationOrchestrator,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    match command {
        Commands::Prepare { output, format } => {
            let overrides = orchestrator
                .prepare_for_new_deploy(cancel)
                .await
                .context("Failed to prepare for deploy")?;
            info!(overrides = overrides.len(), "Prepared certificate overrides");
            output::write_overrides(&overrides, format, output.as_deref())?;
        }

        Commands::Complete => {
            let again = orchestrator
                .post_successful_deploy(cancel)
                .await
                .context("Failed to record successful deploy")?;
            if again {
                println!("Another deploy is required to continue certificate rotation");
            } else {
                println!("No further deploy required");
            }
        }

        Commands::Status => {
            let phase = orchestrator
                .current_phase()
                .await
                .context("Failed to read rotation phase")?;
            print_status(orchestrator.prefix(), phase);
        }

        Commands::Begin { force } => {
            orchestrator
                .begin_rotation(force)
                .await
                .context("Failed to begin rotation")?;
            println!("Certificate rotation started for {}", orchestrator.prefix());
            println!("Run `certrotate prepare` before the next deploy");
        }
    }

    Ok(())
}

fn print_status(prefix: &str, phase: RotationPhase) {
    println!("Prefix: {}", prefix);
    match phase.step() {
        Some(step) => println!("Phase:  {} (step {} of 3)", phase, step),
        None => println!("Phase:  {}", phase),
    }
}
