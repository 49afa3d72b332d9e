//! fleetd: the fleet maintenance daemon.
//!
//! Single binary that assembles:
//! - Node registry (redb)
//! - Retirement maintainer (unallocated, allocated, parking)
//! - Node metrics store with periodic gc
//!
//! # Usage
//!
//! ```text
//! fleetd run --config /etc/fleet/fleetd.toml --data-dir /var/lib/fleet
//! fleetd check-resources --config fleetd.toml --cluster-type content \
//!     --cluster-id search --vcpu 0.5 --memory-gb 2 --disk-gb 10
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fleet_core::{Clock, ClusterSpec, ClusterType, NodeResources, StorageType, SystemClock};
use fleet_limits::NodeResourceLimits;
use fleet_metrics::NodeMetricsDb;
use fleet_retire::{RetiredParker, RetirementController, RetirementMaintainer};
use fleet_state::{NodeRegistry, NodeStore};

use crate::config::DaemonConfig;

#[derive(Parser)]
#[command(name = "fleetd", about = "Fleet maintenance daemon")]
struct Cli {
    /// Log as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the maintenance loops until interrupted.
    Run {
        /// Daemon config file.
        #[arg(long, default_value = "/etc/fleet/fleetd.toml")]
        config: PathBuf,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/fleet")]
        data_dir: PathBuf,
    },

    /// Check a requested node shape against the zone's minimums.
    CheckResources {
        #[arg(long, default_value = "/etc/fleet/fleetd.toml")]
        config: PathBuf,

        #[arg(long)]
        cluster_type: ClusterType,

        #[arg(long)]
        cluster_id: String,

        #[arg(long)]
        vcpu: f64,

        #[arg(long)]
        memory_gb: f64,

        #[arg(long)]
        disk_gb: f64,

        #[arg(long, value_enum)]
        storage: Option<Storage>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Storage {
    Local,
    Remote,
}

impl From<Storage> for StorageType {
    fn from(storage: Storage) -> Self {
        match storage {
            Storage::Local => StorageType::Local,
            Storage::Remote => StorageType::Remote,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run { config, data_dir } => run(config, data_dir).await,
        Command::CheckResources {
            config,
            cluster_type,
            cluster_id,
            vcpu,
            memory_gb,
            disk_gb,
            storage,
        } => {
            let storage = storage.map(StorageType::from).unwrap_or_default();
            let requested = NodeResources::new(vcpu, memory_gb, disk_gb, storage);
            let cluster = ClusterSpec::new(cluster_type, &cluster_id);
            check_resources(config, requested, cluster)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fleetd=debug,fleet=debug"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn run(config_path: PathBuf, data_dir: PathBuf) -> anyhow::Result<()> {
    info!("fleet daemon starting");

    let config = DaemonConfig::from_file(&config_path)?;
    let retire_interval = config.maintenance.retire_interval()?;
    let gc_interval = config.maintenance.gc_interval()?;
    info!(path = ?config_path, zone = %config.zone, "config loaded");

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("fleet.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = NodeStore::open(&db_path)?;
    let registry: Arc<dyn NodeRegistry> = Arc::new(store);
    info!(path = ?db_path, nodes = registry.nodes()?.len(), "node registry opened");

    let policy = config.retirement.build();
    if policy.is_empty() {
        warn!("retirement policy is empty, no node will be retired");
    }
    let redundancy = config.maintenance.redundancy;
    let mut controller =
        RetirementController::new(registry.clone(), Arc::new(policy)).with_redundancy(redundancy);
    if let Some(quotas) = config.maintenance.allocated_quota.clone() {
        controller = controller.with_allocated_quotas(quotas);
    }
    let controller = Arc::new(controller);
    let parker = RetiredParker::new(registry.clone()).with_redundancy(redundancy);
    let maintainer = RetirementMaintainer::new(
        controller,
        parker,
        config.maintenance.unallocated_quota.clone(),
    );
    info!(redundancy, interval = ?retire_interval, "retirement maintainer initialized");

    let metrics = Arc::new(NodeMetricsDb::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    info!(retention = ?metrics.retention(), interval = ?gc_interval, "metrics store initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let retire_shutdown = shutdown_rx.clone();
    let gc_shutdown = shutdown_rx;

    // ── Start background tasks ─────────────────────────────────

    let retire_handle = tokio::spawn(async move {
        maintainer.run(retire_interval, retire_shutdown).await;
    });

    let gc_handle = {
        let metrics = metrics.clone();
        tokio::spawn(async move {
            metrics.run_gc(clock, gc_interval, gc_shutdown).await;
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = retire_handle.await;
    let _ = gc_handle.await;

    info!("fleet daemon stopped");
    Ok(())
}

fn check_resources(
    config_path: PathBuf,
    requested: NodeResources,
    cluster: ClusterSpec,
) -> anyhow::Result<()> {
    let config = DaemonConfig::from_file(&config_path)?;
    let limits = NodeResourceLimits::new(config.zone);

    let legal = limits.enlarge_to_legal(&requested, cluster.cluster_type);
    match limits.ensure_within_advertised_limits("node", &requested, &cluster) {
        Ok(()) => {
            println!("{requested} is within the limits of {}", limits.zone());
            Ok(())
        }
        Err(e) => {
            println!("smallest legal shape: {legal}");
            Err(e.into())
        }
    }
}
