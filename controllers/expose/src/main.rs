//! Expose Controller
//!
//! Watches Deployments and maintains one NodePort Service per deployment,
//! routing port 80 to the deployment's pods via its pod template labels.
//! Deleting a deployment removes its service; label changes are synchronized
//! through an idempotent reconcile loop fed by a deduplicating work queue.

mod client;
mod controller;
mod error;
mod key;
mod reconciler;
mod store;
#[cfg(test)]
mod test_utils;
mod watcher;

use std::path::PathBuf;

use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{error, info};

use crate::controller::{Controller, DEFAULT_WORKERS};
use crate::error::ControllerError;

#[derive(Parser, Debug)]
#[command(
    name = "expose-controller",
    about = "Exposes deployments through per-deployment NodePort services",
    version
)]
struct Args {
    /// Path to a kubeconfig file; the ambient cluster configuration is used
    /// when omitted
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Kubernetes API server address override
    #[arg(long)]
    server: Option<String>,

    /// Number of concurrent reconcile workers
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,
}

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    info!("Starting expose controller");

    let mut config = match &args.kubeconfig {
        Some(path) => {
            info!("Using kubeconfig: {}", path.display());
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                ControllerError::InvalidConfig(format!("failed to read kubeconfig: {e}"))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    ControllerError::InvalidConfig(format!("failed to load kubeconfig: {e}"))
                })?
        }
        None => {
            info!("Using ambient cluster configuration");
            Config::infer().await.map_err(|e| {
                ControllerError::InvalidConfig(format!("failed to infer configuration: {e}"))
            })?
        }
    };
    if let Some(server) = &args.server {
        info!("Overriding API server address: {}", server);
        config.cluster_url = server.parse().map_err(|e| {
            ControllerError::InvalidConfig(format!("invalid API server address {server}: {e}"))
        })?;
    }

    let client = Client::try_from(config)?;
    let controller = Controller::new(client, args.workers);
    controller
        .run(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", err);
            }
        })
        .await
}
