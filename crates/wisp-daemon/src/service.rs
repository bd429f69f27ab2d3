//! Daemon service facade.
//!
//! Bundles the measurement, queue, ledger, and distribution components
//! behind one explicit object that the scheduler and any future control
//! surface call into.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use wisp_distribution::agent::{DistributionReport, DistributionStats, RewardAgent};
use wisp_ledger::{PointsLedger, SharedDb};
use wisp_measure::measurer::{Measurer, TickSummary};
use wisp_queue::{QueueStatus, SubmissionQueue};
use wisp_types::node::Node;
use wisp_types::points::PointsSnapshot;
use wisp_types::proof::UsageProof;

use crate::scheduler::Scheduler;

/// Network-wide statistics snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkStats {
    pub total_nodes: u64,
    pub active_nodes: u64,
    pub total_bytes_served: u64,
    pub total_proofs: u64,
    pub pending_points: u64,
    pub queue_depth: u64,
    pub queue_processing: bool,
}

/// Tick intervals for the scheduled loops.
#[derive(Clone, Copy, Debug)]
pub struct SchedulerSettings {
    pub measurement_interval: Duration,
    pub distribution_interval: Duration,
    /// Run distribution cycles on the scheduler, not only on manual triggers.
    pub distribution_scheduled: bool,
}

/// The daemon's shared service object.
pub struct WispService {
    db: SharedDb,
    ledger: Arc<PointsLedger>,
    queue: Arc<SubmissionQueue>,
    measurer: Arc<Measurer>,
    agent: Arc<RewardAgent>,
    scheduler: Scheduler,
    scheduler_on: AtomicBool,
    settings: SchedulerSettings,
}

impl WispService {
    pub fn new(
        db: SharedDb,
        ledger: Arc<PointsLedger>,
        queue: Arc<SubmissionQueue>,
        measurer: Arc<Measurer>,
        agent: Arc<RewardAgent>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            db,
            ledger,
            queue,
            measurer,
            agent,
            scheduler: Scheduler::new(),
            scheduler_on: AtomicBool::new(false),
            settings,
        }
    }

    /// Start the measurement and distribution tickers. Idempotent while
    /// running.
    pub fn start_scheduler(self: &Arc<Self>) {
        if self.scheduler_on.swap(true, Ordering::AcqRel) {
            warn!("scheduler already running");
            return;
        }

        let measure_service = Arc::clone(self);
        self.scheduler.spawn(
            "measurement",
            self.settings.measurement_interval,
            move || {
                let service = Arc::clone(&measure_service);
                async move {
                    match service.run_measurement_tick().await {
                        Ok(summary) => info!(
                            measured = summary.measured,
                            synthetic = summary.synthetic,
                            skipped = summary.skipped,
                            "measurement tick complete"
                        ),
                        Err(e) => warn!("measurement tick failed: {e}"),
                    }
                }
            },
        );

        if self.settings.distribution_scheduled {
            let dist_service = Arc::clone(self);
            self.scheduler.spawn(
                "distribution",
                self.settings.distribution_interval,
                move || {
                    let service = Arc::clone(&dist_service);
                    async move {
                        let report = service.trigger_distribution().await;
                        info!(
                            success = report.success,
                            users = report.total_users,
                            amount = report.total_amount,
                            "scheduled distribution complete"
                        );
                    }
                },
            );
        } else {
            info!("scheduled distribution disabled by config");
        }
    }

    /// Stop the tickers and wait for any in-flight handler to finish.
    pub async fn stop_scheduler(&self) {
        if !self.scheduler_on.swap(false, Ordering::AcqRel) {
            return;
        }
        self.scheduler.shutdown().await;
    }

    /// Register a node for an owner. Idempotent.
    pub async fn register_node(&self, node_id: &str, owner_id: &str) -> anyhow::Result<Node> {
        let now = wisp_types::unix_now();
        let conn = self.db.lock().await;
        let node = wisp_db::queries::nodes::create_or_get_node(&conn, node_id, owner_id, now)?;
        info!(node_id, owner_id, "node registered");
        Ok(node)
    }

    /// Soft-enable or disable a node. Disabled nodes are skipped by the
    /// measurement tick and reject on-demand measurement; they are never
    /// hard-deleted.
    pub async fn set_node_active(&self, node_id: &str, active: bool) -> anyhow::Result<Node> {
        let conn = self.db.lock().await;
        match wisp_db::queries::nodes::set_node_active(&conn, node_id, active) {
            Ok(()) => {}
            Err(wisp_db::DbError::NotFound(_)) => {
                return Err(wisp_measure::MeasureError::NodeNotFound(node_id.to_string()).into())
            }
            Err(e) => return Err(e.into()),
        }
        info!(node_id, active, "node active flag updated");
        Ok(wisp_db::queries::nodes::get_node(&conn, node_id)?)
    }

    /// Record the payout address for a user.
    pub async fn set_payout_address(&self, user_id: &str, address: &str) -> anyhow::Result<()> {
        let conn = self.db.lock().await;
        wisp_db::queries::users::set_payout_address(&conn, user_id, address, wisp_types::unix_now())?;
        Ok(())
    }

    /// Measure a single node on demand.
    ///
    /// Returns `None` when the probe failed and no fallback was taken.
    pub async fn measure_once(&self, node_id: &str) -> anyhow::Result<Option<UsageProof>> {
        Ok(self.measurer.measure_once(node_id).await?)
    }

    /// Run one measurement tick over every active node.
    pub async fn run_measurement_tick(&self) -> anyhow::Result<TickSummary> {
        Ok(self.measurer.tick().await?)
    }

    /// Current network totals, proof counts, and queue state.
    pub async fn network_stats(&self) -> anyhow::Result<NetworkStats> {
        let (totals, total_proofs) = {
            let conn = self.db.lock().await;
            (
                wisp_db::queries::nodes::network_totals(&conn)?,
                wisp_db::queries::proofs::proof_count(&conn)?,
            )
        };
        let pending_points = self.ledger.total_today_points().await?;
        let QueueStatus { depth, processing } = self.queue.status().await;

        Ok(NetworkStats {
            total_nodes: totals.total_nodes,
            active_nodes: totals.active_nodes,
            total_bytes_served: totals.total_bytes_served,
            total_proofs,
            pending_points,
            queue_depth: depth as u64,
            queue_processing: processing,
        })
    }

    /// A user's point counters.
    pub async fn user_points(&self, user_id: &str) -> anyhow::Result<PointsSnapshot> {
        Ok(self.ledger.read(user_id).await?)
    }

    /// Run one distribution cycle now, outside the schedule.
    pub async fn trigger_distribution(&self) -> DistributionReport {
        let report = self.agent.trigger().await;
        if !report.success {
            warn!(error = ?report.error, "distribution cycle failed");
        }
        report
    }

    /// Distribution state and last-cycle report.
    pub async fn distribution_stats(&self) -> anyhow::Result<DistributionStats> {
        Ok(self.agent.stats().await?)
    }
}
