//! Traincrd Operator - keeps training job workloads in sync with their TrainJob resources

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use kube::api::{Api, ListParams};
use kube::runtime::watcher;
use miette::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use traincrd_core::{TrainJob, crd_manifest};
use traincrd_kube::{EventDispatcher, ReconcileEngine, job_events};

mod config;
mod error;

use config::OperatorConfig;
use error::OperatorError;

#[derive(Parser, Debug)]
#[command(name = "traincrd-operator")]
#[command(version)]
#[command(about = "Kubernetes controller for TrainJob resources", long_about = None)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, env = "TRAINCRD_CONFIG")]
    config: Option<PathBuf>,

    /// Watch a single namespace instead of the whole cluster
    #[arg(short, long, env = "TRAINCRD_NAMESPACE")]
    namespace: Option<String>,

    /// Maximum number of jobs reconciled concurrently
    #[arg(short, long)]
    workers: Option<usize>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print the TrainJob CRD manifest and exit
    #[arg(long)]
    crd: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_panic_hook();

    let cli = Cli::parse();

    if cli.crd {
        let manifest = serde_yaml::to_string(&crd_manifest()).map_err(OperatorError::Render)?;
        print!("{manifest}");
        return Ok(());
    }

    init_tracing(&cli.log_level)?;

    let config = match &cli.config {
        Some(path) => OperatorConfig::load_from(path)?,
        None => OperatorConfig::default(),
    }
    .with_overrides(cli.namespace, cli.workers);
    config.validate()?;

    run(config).await?;
    Ok(())
}

fn init_tracing(log_level: &str) -> error::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level).map_err(|_| OperatorError::Logging {
            filter: log_level.to_string(),
        })?,
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
    Ok(())
}

async fn run(config: OperatorConfig) -> error::Result<()> {
    let client = kube::Client::try_default()
        .await
        .map_err(OperatorError::Client)?;

    let jobs: Api<TrainJob> = match &config.namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };
    // Fail fast when the CRD is missing or RBAC forbids listing
    jobs.list(&ListParams::default().limit(1))
        .await
        .map_err(OperatorError::CrdUnavailable)?;

    info!(
        namespace = config.namespace.as_deref().unwrap_or("<all>"),
        workers = config.dispatcher.workers,
        "traincrd operator starting"
    );

    let engine = Arc::new(ReconcileEngine::with_client(client, config.reconcile));
    let dispatcher = EventDispatcher::new(engine, config.dispatcher);

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown requested, draining in-flight reconciles");
        trigger.cancel();
    });

    let stats = dispatcher
        .run(job_events(jobs, watcher::Config::default()), shutdown)
        .await;

    info!(
        handled = stats.handled,
        failed = stats.failed,
        dropped = stats.dropped,
        "traincrd operator stopped"
    );
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGTERM, only Ctrl-C stops the operator");
            wait_for_ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    wait_for_ctrl_c().await;
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
