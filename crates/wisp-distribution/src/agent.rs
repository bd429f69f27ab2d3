//! The reward distribution agent.
//!
//! One cycle walks `Idle → Snapshotting → Funding → Distributing → Resetting
//! → Idle`; a failure in any of the three middle phases absorbs into `Failed`
//! and returns to `Idle` without touching a single counter. Only a
//! gateway-confirmed batch reaches `Resetting`, and resets subtract exactly
//! the snapshotted amounts.
//!
//! Scheduled and manual triggers share one execution path and are mutually
//! exclusive: a trigger while a cycle is in flight reports "already running"
//! instead of queuing. Every gateway call is bounded by a timeout so a hung
//! settlement layer fails the cycle instead of pinning the running flag
//! forever.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wisp_db::queries::settlements::SettlementRow;
use wisp_gateway::SettlementGateway;
use wisp_ledger::{PointsLedger, SharedDb};
use wisp_types::settlement::{BatchStatus, SettlementBatch};
use wisp_types::unix_now;

use crate::split::{self, PayoutSplitConfig};
use crate::{DistributionError, Result};

/// Default deadline for one gateway call.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(60);

/// Distribution agent configuration.
#[derive(Clone, Debug)]
pub struct DistributionConfig {
    /// Micro-wisps per point.
    pub rate_micro_wisps_per_point: u64,
    /// Contributor/charity split.
    pub split: PayoutSplitConfig,
    /// Deadline for each gateway call.
    pub gateway_timeout: Duration,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            rate_micro_wisps_per_point: wisp_types::DEFAULT_RATE_MICRO_WISPS_PER_POINT,
            split: split::DEFAULT_SPLIT,
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }
}

/// Observable phase of the distribution state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CyclePhase {
    Idle = 0,
    Snapshotting = 1,
    Funding = 2,
    Distributing = 3,
    Resetting = 4,
}

impl CyclePhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => CyclePhase::Snapshotting,
            2 => CyclePhase::Funding,
            3 => CyclePhase::Distributing,
            4 => CyclePhase::Resetting,
            _ => CyclePhase::Idle,
        }
    }
}

/// Outcome of one distribution cycle.
///
/// Returned from both the scheduler loop and manual triggers, and surfaced in
/// [`DistributionStats`], so every caller sees the same reporting shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DistributionReport {
    pub success: bool,
    pub total_users: u64,
    pub total_points: u64,
    pub total_amount: u64,
    pub user_share: u64,
    pub charity_share: u64,
    pub tx_id: Option<String>,
    pub error: Option<String>,
}

impl DistributionReport {
    fn zero(success: bool, error: Option<String>) -> Self {
        Self {
            success,
            total_users: 0,
            total_points: 0,
            total_amount: 0,
            user_share: 0,
            charity_share: 0,
            tx_id: None,
            error,
        }
    }

    fn from_batch(batch: &SettlementBatch, success: bool, error: Option<String>) -> Self {
        Self {
            success,
            total_users: batch.entries.len() as u64,
            total_points: batch.total_points,
            total_amount: batch.total_amount,
            user_share: batch.user_share,
            charity_share: batch.charity_share,
            tx_id: batch.tx_id.clone(),
            error,
        }
    }
}

/// Read-only distribution stats, independent of triggering a cycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DistributionStats {
    pub eligible_users: u64,
    pub eligible_points: u64,
    pub treasury_balance: u64,
    pub running: bool,
    pub phase: CyclePhase,
    /// Unix seconds of the last confirmed cycle, 0 if none.
    pub last_distribution_at: u64,
    pub last_report: Option<DistributionReport>,
}

/// The reward distribution agent.
pub struct RewardAgent {
    db: SharedDb,
    ledger: Arc<PointsLedger>,
    gateway: Arc<dyn SettlementGateway>,
    config: DistributionConfig,
    running: AtomicBool,
    phase: AtomicU8,
    last_report: Mutex<Option<DistributionReport>>,
}

impl RewardAgent {
    pub fn new(
        db: SharedDb,
        ledger: Arc<PointsLedger>,
        gateway: Arc<dyn SettlementGateway>,
        config: DistributionConfig,
    ) -> Result<Self> {
        split::validate_split(&config.split)?;
        Ok(Self {
            db,
            ledger,
            gateway,
            config,
            running: AtomicBool::new(false),
            phase: AtomicU8::new(CyclePhase::Idle as u8),
            last_report: Mutex::new(None),
        })
    }

    /// Current state machine phase.
    pub fn phase(&self) -> CyclePhase {
        CyclePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Whether a cycle is in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one distribution cycle, or report "already running" if a cycle is
    /// in flight. Shared by the scheduler and manual triggers.
    pub async fn trigger(&self) -> DistributionReport {
        if self.running.swap(true, Ordering::AcqRel) {
            tracing::info!("distribution trigger rejected: cycle already running");
            return DistributionReport::zero(
                false,
                Some(DistributionError::AlreadyRunning.to_string()),
            );
        }

        let report = self.run_cycle().await;
        if report.success || report.error.is_some() {
            let mut last = lock_report(&self.last_report);
            *last = Some(report.clone());
        }

        self.set_phase(CyclePhase::Idle);
        self.running.store(false, Ordering::Release);
        report
    }

    /// Read-only stats. Never starts a cycle.
    pub async fn stats(&self) -> Result<DistributionStats> {
        let eligible = self.ledger.snapshot_eligible().await?;
        let treasury_balance = self
            .gateway_call(self.gateway.get_treasury_balance())
            .await?;
        let last_distribution_at = {
            let conn = self.db.lock().await;
            wisp_db::queries::settings::get(&conn, "last_distribution_at")?
                .and_then(|v| v.parse().ok())
                .unwrap_or(0)
        };

        Ok(DistributionStats {
            eligible_users: eligible.len() as u64,
            eligible_points: eligible.iter().map(|e| e.today_points).sum(),
            treasury_balance,
            running: self.is_running(),
            phase: self.phase(),
            last_distribution_at,
            last_report: lock_report(&self.last_report).clone(),
        })
    }

    async fn run_cycle(&self) -> DistributionReport {
        self.set_phase(CyclePhase::Snapshotting);

        let eligible = match self.ledger.snapshot_eligible().await {
            Ok(eligible) => eligible,
            Err(err) => return self.fail(None, err.into()).await,
        };

        let mut batch = match split::compute_batch(
            &eligible,
            self.config.rate_micro_wisps_per_point,
            &self.config.split,
        ) {
            Ok(batch) => batch,
            Err(err) => return self.fail(None, err).await,
        };

        if batch.is_empty() {
            tracing::info!("distribution cycle: no eligible users, nothing to settle");
            return DistributionReport::zero(true, None);
        }

        tracing::info!(
            batch_id = %batch.batch_id,
            users = batch.entries.len(),
            points = batch.total_points,
            amount = batch.total_amount,
            "distribution cycle: snapshot computed"
        );

        // A dangling `submitted` row for this exact snapshot means a previous
        // cycle paid the batch but died before resetting counters. Skip
        // payment and perform only the withheld reset.
        let already_paid = match self.dangling_submission(&batch.batch_id).await {
            Ok(row) => row,
            Err(err) => return self.fail(Some(&batch), err).await,
        };

        match already_paid {
            Some(row) => {
                tracing::warn!(
                    batch_id = %batch.batch_id,
                    tx_id = ?row.tx_id,
                    "batch already paid by an interrupted cycle, resuming reset"
                );
                batch.tx_id = row.tx_id;
                batch.status = BatchStatus::Submitted;
            }
            None => {
                self.set_phase(CyclePhase::Funding);
                let treasury = match self.gateway_call(self.gateway.get_treasury_balance()).await {
                    Ok(balance) => balance,
                    Err(err) => return self.fail(Some(&batch), err).await,
                };
                if treasury < batch.total_amount {
                    return self
                        .fail(
                            Some(&batch),
                            DistributionError::InsufficientTreasury {
                                available: treasury,
                                required: batch.total_amount,
                            },
                        )
                        .await;
                }

                if let Err(err) = self
                    .gateway_call(self.gateway.fund_distribution_pool(batch.total_amount))
                    .await
                {
                    return self.fail(Some(&batch), err).await;
                }
                batch.status = BatchStatus::Funded;

                self.set_phase(CyclePhase::Distributing);
                let payouts: Vec<(String, u64)> = batch
                    .entries
                    .iter()
                    .map(|entry| (entry.payout_address.clone(), entry.amount))
                    .collect();

                let tx_id = match self
                    .gateway_call(self.gateway.batch_pay(&payouts, &batch.batch_id))
                    .await
                {
                    Ok(tx_id) => tx_id,
                    Err(err) => return self.fail(Some(&batch), err).await,
                };
                batch.tx_id = Some(tx_id);
                batch.status = BatchStatus::Submitted;

                // Persist the paid-but-not-reset marker before touching any
                // counter, so a crash here is recoverable without double pay.
                if let Err(err) = self.log_batch(&batch, None).await {
                    return self.fail(Some(&batch), err.into()).await;
                }
            }
        }

        self.set_phase(CyclePhase::Resetting);
        let mut reset_error: Option<String> = None;
        for entry in &batch.entries {
            if let Err(err) = self.ledger.reset_today(&entry.user_id, entry.points).await {
                // The payout is already on chain; keep resetting the rest and
                // surface the error in the report.
                tracing::error!(user_id = %entry.user_id, error = %err, "counter reset failed");
                reset_error = Some(err.to_string());
            }
        }

        batch.status = BatchStatus::Confirmed;
        if let Err(err) = self.log_batch(&batch, reset_error.clone()).await {
            tracing::error!(error = %err, "failed to log confirmed settlement");
        }
        {
            let conn = self.db.lock().await;
            let now = wisp_types::unix_now().to_string();
            if let Err(err) =
                wisp_db::queries::settings::set(&conn, "last_distribution_at", &now)
            {
                tracing::error!(error = %err, "failed to record distribution timestamp");
            }
        }

        tracing::info!(
            batch_id = %batch.batch_id,
            tx_id = ?batch.tx_id,
            users = batch.entries.len(),
            amount = batch.total_amount,
            "distribution cycle confirmed"
        );
        DistributionReport::from_batch(&batch, true, reset_error)
    }

    /// Abort the cycle: log the failure and report it. No counters touched.
    async fn fail(
        &self,
        batch: Option<&SettlementBatch>,
        err: DistributionError,
    ) -> DistributionReport {
        tracing::error!(error = %err, "distribution cycle failed");

        if let Some(batch) = batch {
            let mut failed = batch.clone();
            failed.status = BatchStatus::Failed;
            if let Err(log_err) = self.log_batch(&failed, Some(err.to_string())).await {
                tracing::error!(error = %log_err, "failed to log failed settlement");
            }
            DistributionReport::from_batch(&failed, false, Some(err.to_string()))
        } else {
            DistributionReport::zero(false, Some(err.to_string()))
        }
    }

    async fn dangling_submission(&self, batch_id: &str) -> Result<Option<SettlementRow>> {
        let conn = self.db.lock().await;
        let last = wisp_db::queries::settlements::last_settlement(&conn)?;
        Ok(last.filter(|row| row.status == "submitted" && row.batch_id == batch_id))
    }

    async fn log_batch(&self, batch: &SettlementBatch, error: Option<String>) -> wisp_db::Result<()> {
        let conn = self.db.lock().await;
        wisp_db::queries::settlements::insert_settlement(
            &conn,
            &SettlementRow {
                batch_id: batch.batch_id.clone(),
                status: batch.status.as_str().to_string(),
                total_users: batch.entries.len() as u64,
                total_points: batch.total_points,
                total_amount: batch.total_amount,
                user_share: batch.user_share,
                charity_share: batch.charity_share,
                tx_id: batch.tx_id.clone(),
                error,
                executed_at: unix_now(),
            },
        )
    }

    async fn gateway_call<T>(
        &self,
        call: impl Future<Output = wisp_gateway::Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.gateway_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(DistributionError::GatewayFailure(err.to_string())),
            Err(_elapsed) => Err(DistributionError::GatewayFailure(format!(
                "timed out after {}s",
                self.config.gateway_timeout.as_secs()
            ))),
        }
    }

    fn set_phase(&self, phase: CyclePhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
}

fn lock_report(
    report: &Mutex<Option<DistributionReport>>,
) -> std::sync::MutexGuard<'_, Option<DistributionReport>> {
    match report.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
