//! Slurm Bridge Operator - Main Entry Point
//!
//! Wires the scheduler, the pod and node reconcilers and the admission
//! webhook to one Kubernetes cluster and one Slurm REST endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use kube::Client;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use slurm_bridge_admission::{server as webhook, PodAdmission};
use slurm_bridge_cluster::{watch, KubeCluster, NodeApi};
use slurm_bridge_controllers::node::{NodeController, NodeReconciler, RealNodeSlurmControl};
use slurm_bridge_controllers::pod::{PodController, PodReconciler, RealPodSlurmControl};
use slurm_bridge_domain::{nodemap, Config};
use slurm_bridge_scheduler::{RealSlurmControl, SchedulerRunner, SlurmBridge};
use slurm_bridge_slurm_client::{JobInformer, NodeInformer, SlurmClient, SlurmClientConfig};

/// Slurm Bridge Operator
#[derive(Parser, Debug)]
#[command(name = "slurm-bridge-operator")]
#[command(about = "Bridges Kubernetes pod placement to the Slurm workload manager", long_about = None)]
struct Args {
    /// Webhook listen address
    #[arg(long, default_value = "0.0.0.0:9443")]
    pub webhook_addr: SocketAddr,

    /// Scheduling cycle interval in seconds
    #[arg(long, default_value_t = 2)]
    pub scheduler_interval: u64,

    /// Slurm informer poll interval in seconds
    #[arg(long, default_value_t = 5)]
    pub informer_interval: u64,

    /// Max concurrent workers for the Pod controller
    #[arg(long, default_value_t = 1)]
    pub pod_workers: usize,

    /// Max concurrent workers for the Node controller
    #[arg(long, default_value_t = 1)]
    pub node_workers: usize,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level {
        LogLevel::Trace => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    info!("Starting Slurm Bridge Operator");

    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    info!(
        scheduler = %config.scheduler_name,
        slurm_rest_api = %config.slurm_rest_api,
        "Operator configuration"
    );

    let kube_client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    info!("Connected to Kubernetes");

    let slurm_client = SlurmClient::new(&SlurmClientConfig {
        server: config.slurm_rest_api.clone(),
        auth_token: std::env::var("SLURM_JWT").unwrap_or_default(),
    })
    .context("Failed to create Slurm client")?;

    let cluster = Arc::new(KubeCluster::new(kube_client.clone()));

    // An ambiguous slurm-nodename mapping makes placement undefined;
    // refuse to start with one.
    let nodes = NodeApi::list(cluster.as_ref())
        .await
        .context("Failed to list nodes")?;
    nodemap::check_collisions(&nodes).context("Node name mapping is ambiguous")?;

    let token = CancellationToken::new();

    // Slurm informers feed both reconcilers.
    let (job_tx, job_rx) = mpsc::unbounded_channel();
    let (slurm_node_tx, slurm_node_rx) = mpsc::unbounded_channel();
    tokio::spawn(
        JobInformer::new(
            slurm_client.clone(),
            Duration::from_secs(args.informer_interval),
            job_tx,
        )
        .run(token.child_token()),
    );
    tokio::spawn(
        NodeInformer::new(
            slurm_client.clone(),
            Duration::from_secs(args.informer_interval),
            slurm_node_tx,
        )
        .run(token.child_token()),
    );

    // Kubernetes watches feed the work queues.
    let (pod_tx, pod_rx) = mpsc::unbounded_channel();
    let (kube_node_tx, kube_node_rx) = mpsc::unbounded_channel();
    tokio::spawn(watch::run_pod_watch(
        kube_client.clone(),
        pod_tx,
        token.child_token(),
    ));
    tokio::spawn(watch::run_node_watch(
        kube_client.clone(),
        kube_node_tx,
        token.child_token(),
    ));

    // Pod controller.
    let pod_slurm = Arc::new(RealPodSlurmControl::new(slurm_client.clone()));
    let pod_reconciler = Arc::new(PodReconciler::new(
        cluster.clone(),
        pod_slurm.clone(),
        config.scheduler_name.clone(),
    ));
    let pod_controller = Arc::new(PodController::new(
        pod_reconciler,
        cluster.clone(),
        pod_slurm,
        config.scheduler_name.clone(),
        args.pod_workers,
    ));
    tokio::spawn(pod_controller.run(pod_rx, job_rx, token.child_token()));
    info!("Pod controller started");

    // Node controller.
    let node_slurm = Arc::new(RealNodeSlurmControl::new(slurm_client.clone()));
    let node_reconciler = Arc::new(NodeReconciler::new(
        cluster.clone(),
        node_slurm,
        config.scheduler_name.clone(),
    ));
    let node_controller = Arc::new(NodeController::new(
        node_reconciler,
        cluster.clone(),
        args.node_workers,
    ));
    tokio::spawn(node_controller.run(kube_node_rx, slurm_node_rx, token.child_token()));
    info!("Node controller started");

    // Scheduler.
    let slurm_control = Arc::new(RealSlurmControl::new(
        slurm_client.clone(),
        config.mcs_label.clone(),
        config.partition.clone(),
    ));
    let plugin = Arc::new(SlurmBridge::new(
        cluster.clone(),
        cluster.clone(),
        cluster.clone(),
        slurm_control,
        config.scheduler_name.clone(),
    ));
    let runner = SchedulerRunner::new(
        plugin,
        cluster.clone(),
        config.scheduler_name.clone(),
        Duration::from_secs(args.scheduler_interval),
    );
    tokio::spawn(runner.run(token.child_token()));
    info!("Scheduler started");

    // Admission webhook.
    let admission = Arc::new(PodAdmission::new(
        cluster.clone(),
        config.scheduler_name.clone(),
        config.managed_namespaces.clone(),
        config.managed_namespace_selector.clone(),
    ));
    let webhook_token = token.child_token();
    let webhook_addr = args.webhook_addr;
    tokio::spawn(async move {
        if let Err(e) = webhook::serve(admission, webhook_addr, webhook_token).await {
            tracing::error!(error = %e, "admission webhook exited");
        }
    });
    info!("Admission webhook started");

    info!("Operator is running. Press Ctrl+C to stop.");
    let _ = signal::ctrl_c().await;
    info!("Shutting down operator...");
    token.cancel();

    Ok(())
}
