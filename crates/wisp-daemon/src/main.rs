//! wisp-daemon: the Wisp contribution and settlement daemon.
//!
//! Single OS process running a Tokio async runtime. Hosts the measurement
//! loop, the proof submission queue, and the scheduled reward distribution
//! agent.

mod config;
mod rpc;
mod scheduler;
mod service;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use wisp_distribution::agent::{DistributionConfig, RewardAgent};
use wisp_distribution::split::PayoutSplitConfig;
use wisp_gateway::stub::StubGateway;
use wisp_gateway::SettlementGateway;
use wisp_ledger::PointsLedger;
use wisp_measure::generator::ProofGenerator;
use wisp_measure::measurer::Measurer;
use wisp_measure::probe::{ContributionProbe, InterfaceProbe, SyntheticProbe};
use wisp_queue::SubmissionQueue;

use crate::config::DaemonConfig;
use crate::service::{SchedulerSettings, WispService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wisp=info".parse()?),
        )
        .init();

    info!("Wisp daemon starting");

    // 1. Load config
    let config = DaemonConfig::load()?;
    let data_dir = config.data_dir();

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;

    // 2. Open database
    let db_path = data_dir.join("wisp.db");
    let conn = wisp_db::open(&db_path)?;
    let db = Arc::new(tokio::sync::Mutex::new(conn));

    // 3. Gateway and ledger
    let gateway: Arc<dyn SettlementGateway> = Arc::new(StubGateway::new());
    let ledger = Arc::new(PointsLedger::new(Arc::clone(&db)));

    // 4. Submission queue with its consumer task
    let queue = Arc::new(SubmissionQueue::new(
        Arc::clone(&gateway),
        Arc::clone(&db),
        Duration::from_secs(config.queue.retry_interval_secs),
    ));
    let queue_handle = queue.start();

    // 5. Measurement pipeline
    let probe: Arc<dyn ContributionProbe> = match config.measurement.probe.as_str() {
        "interface" => Arc::new(InterfaceProbe::new(&config.measurement.interface)),
        "synthetic" => Arc::new(SyntheticProbe::new(config.measurement.max_synthetic_bytes)),
        other => {
            warn!(probe = other, "unknown probe mode, using synthetic");
            Arc::new(SyntheticProbe::new(config.measurement.max_synthetic_bytes))
        }
    };
    let fallback = if config.measurement.synthetic_fallback {
        Some(Arc::new(SyntheticProbe::new(
            config.measurement.max_synthetic_bytes,
        )))
    } else {
        None
    };
    let generator = ProofGenerator::new(
        Arc::clone(&db),
        Arc::clone(&ledger),
        Arc::clone(&queue),
        config.measurement.credit_synthetic,
    );
    let measurer = Arc::new(Measurer::new(
        Arc::clone(&db),
        probe,
        fallback,
        generator,
        Duration::from_secs(config.measurement.probe_timeout_secs),
    ));

    // 6. Reward distribution agent
    let agent = Arc::new(RewardAgent::new(
        Arc::clone(&db),
        Arc::clone(&ledger),
        Arc::clone(&gateway),
        DistributionConfig {
            rate_micro_wisps_per_point: config.distribution.rate_micro_wisps_per_point,
            split: PayoutSplitConfig {
                user_pct: config.distribution.user_share_pct,
                charity_pct: config.distribution.charity_share_pct,
            },
            gateway_timeout: Duration::from_secs(config.distribution.gateway_timeout_secs),
        },
    )?);

    // 7. Service facade and schedulers
    let service = Arc::new(WispService::new(
        db,
        ledger,
        queue,
        measurer,
        agent,
        SchedulerSettings {
            measurement_interval: Duration::from_secs(config.measurement.interval_secs),
            distribution_interval: Duration::from_secs(config.distribution.interval_secs),
            distribution_scheduled: config.distribution.scheduled,
        },
    ));
    service.start_scheduler();

    // 8. IPC control surface
    let socket_path = data_dir.join("daemon.sock");
    let rpc_server = rpc::RpcServer::new(Arc::clone(&service), socket_path.clone());

    info!(data_dir = %data_dir.display(), "Wisp daemon running");

    // 9. Run the RPC server until Ctrl-C
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                tracing::error!("RPC server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    service.stop_scheduler().await;
    queue_handle.abort();

    // Clean up socket file
    let _ = std::fs::remove_file(&socket_path);

    info!("Daemon stopped");
    Ok(())
}
