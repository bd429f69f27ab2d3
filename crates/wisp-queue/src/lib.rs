//! # wisp-queue
//!
//! The proof submission queue: a FIFO of usage proofs awaiting anchoring on
//! the settlement layer, drained by a single consumer.
//!
//! The external gateway may not tolerate parallel or out-of-order calls from
//! one caller, so there is exactly one in-flight anchor at a time. On failure
//! the proof goes back to the *front* of the queue (order preserved) and the
//! drain stops until the retry interval elapses or a new proof arrives — no
//! hot failure spin. Delivery is at-least-once; duplicate anchoring is
//! harmless because the proof hash is idempotent downstream.
//!
//! There is no cancellation. The queue drains best-effort for the life of the
//! process; proofs lost on crash remain in the store with a NULL settlement
//! tx id for manual reconciliation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::{Mutex, Notify};
use wisp_gateway::SettlementGateway;
use wisp_types::proof::UsageProof;

/// Shared handle to the single daemon database connection.
pub type SharedDb = Arc<Mutex<Connection>>;

/// Default pause after a failed anchor attempt.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Queue status for observability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueStatus {
    /// Proofs waiting for anchoring.
    pub depth: usize,
    /// Whether the consumer currently has an anchor call in flight.
    pub processing: bool,
}

/// Single-consumer submission queue for proof anchoring.
pub struct SubmissionQueue {
    pending: Mutex<VecDeque<UsageProof>>,
    notify: Notify,
    processing: AtomicBool,
    gateway: Arc<dyn SettlementGateway>,
    db: SharedDb,
    retry_interval: Duration,
}

impl SubmissionQueue {
    /// Create a queue over the given gateway and proof store.
    pub fn new(gateway: Arc<dyn SettlementGateway>, db: SharedDb, retry_interval: Duration) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            processing: AtomicBool::new(false),
            gateway,
            db,
            retry_interval,
        }
    }

    /// Append a proof for anchoring and wake the consumer. Never blocks on
    /// the gateway.
    pub async fn enqueue(&self, proof: UsageProof) {
        {
            let mut pending = self.pending.lock().await;
            pending.push_back(proof);
        }
        self.notify.notify_one();
    }

    /// Number of proofs waiting.
    pub async fn depth(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Whether an anchor call is in flight.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Current queue status.
    pub async fn status(&self) -> QueueStatus {
        QueueStatus {
            depth: self.depth().await,
            processing: self.is_processing(),
        }
    }

    /// Spawn the consumer task. Runs for the life of the process.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move { queue.run().await })
    }

    /// Consumer loop: drain until empty or a failure, then wait for the next
    /// enqueue or the retry timer.
    async fn run(&self) {
        loop {
            match self.drain().await {
                DrainOutcome::Empty => self.notify.notified().await,
                DrainOutcome::Failed => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.retry_interval) => {}
                        _ = self.notify.notified() => {}
                    }
                }
            }
        }
    }

    /// Anchor proofs head-first until the queue empties or an attempt fails.
    async fn drain(&self) -> DrainOutcome {
        loop {
            let Some(proof) = self.pending.lock().await.pop_front() else {
                return DrainOutcome::Empty;
            };

            self.processing.store(true, Ordering::Release);
            let result = self
                .gateway
                .anchor_proof(&proof.proof_hash, &anchor_metadata(&proof))
                .await;
            self.processing.store(false, Ordering::Release);

            match result {
                Ok(tx_id) => {
                    tracing::debug!(proof_hash = %proof.proof_hash, tx_id, "proof anchored");
                    self.stamp(&proof.proof_hash, &tx_id).await;
                }
                Err(err) => {
                    tracing::warn!(
                        proof_hash = %proof.proof_hash,
                        error = %err,
                        "anchor failed, re-queued at front"
                    );
                    self.pending.lock().await.push_front(proof);
                    return DrainOutcome::Failed;
                }
            }
        }
    }

    async fn stamp(&self, proof_hash: &str, tx_id: &str) {
        let conn = self.db.lock().await;
        if let Err(err) = wisp_db::queries::proofs::stamp_proof_settlement(&conn, proof_hash, tx_id)
        {
            // The anchor succeeded; a stamp failure leaves the proof
            // reconcilable by its NULL tx id.
            tracing::error!(proof_hash, tx_id, error = %err, "failed to stamp proof");
        }
    }
}

enum DrainOutcome {
    Empty,
    Failed,
}

/// Metadata forwarded with an anchor call.
fn anchor_metadata(proof: &UsageProof) -> String {
    serde_json::json!({
        "node_id": proof.node_id,
        "session_id": proof.session_id,
        "timestamp": proof.timestamp,
        "bytes_served": proof.bytes_served,
    })
    .to_string()
}
