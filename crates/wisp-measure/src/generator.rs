//! The proof generation pipeline.
//!
//! One sample in, one proof plus a point credit out. Side effects happen in a
//! fixed order: node counters, proof persisted with a NULL settlement tx id,
//! points credited, proof enqueued for anchoring. The credit step never
//! depends on the enqueue or anchor outcome — points are earned at
//! measurement time, not at anchoring time.

use std::sync::Arc;

use wisp_ledger::{PointsLedger, SharedDb};
use wisp_proof::{hash, points};
use wisp_queue::SubmissionQueue;
use wisp_types::proof::UsageProof;
use wisp_types::sample::ContributionSample;

use crate::{MeasureError, Result};

/// Sample-to-proof pipeline with its credit policy.
pub struct ProofGenerator {
    db: SharedDb,
    ledger: Arc<PointsLedger>,
    queue: Arc<SubmissionQueue>,
    /// Whether synthetic-fallback samples earn points. On by default; flip
    /// off to exclude simulated contributions from payouts while still
    /// recording their proofs for audit.
    credit_synthetic: bool,
}

impl ProofGenerator {
    pub fn new(
        db: SharedDb,
        ledger: Arc<PointsLedger>,
        queue: Arc<SubmissionQueue>,
        credit_synthetic: bool,
    ) -> Self {
        Self {
            db,
            ledger,
            queue,
            credit_synthetic,
        }
    }

    /// Generate and record the proof for one sample.
    ///
    /// Rejects unknown or inactive nodes with no side effects applied.
    pub async fn generate(&self, sample: ContributionSample) -> Result<UsageProof> {
        let owner_id = {
            let conn = self.db.lock().await;
            let node = match wisp_db::queries::nodes::get_node(&conn, &sample.node_id) {
                Ok(node) => node,
                Err(wisp_db::DbError::NotFound(_)) => {
                    return Err(MeasureError::NodeNotFound(sample.node_id))
                }
                Err(e) => return Err(e.into()),
            };
            if !node.active {
                return Err(MeasureError::NodeInactive(sample.node_id));
            }

            wisp_db::queries::nodes::update_node_counters(
                &conn,
                &sample.node_id,
                sample.bytes_served,
                sample.uptime_percent,
                sample.timestamp,
            )?;
            node.owner_id
        };

        let proof = UsageProof {
            proof_hash: hash::proof_hash_hex(
                &sample.node_id,
                &sample.session_id,
                sample.timestamp,
                sample.bytes_served,
            ),
            node_id: sample.node_id.clone(),
            session_id: sample.session_id,
            timestamp: sample.timestamp,
            bytes_served: sample.bytes_served,
            uptime_percent: sample.uptime_percent,
            synthetic: sample.source == wisp_types::sample::SampleSource::Synthetic,
            settlement_tx_id: None,
        };

        {
            let conn = self.db.lock().await;
            wisp_db::queries::proofs::insert_proof(&conn, &proof)?;
        }

        let earned = points::points_for_bytes(proof.bytes_served);
        let credit = if proof.synthetic && !self.credit_synthetic {
            0
        } else {
            earned
        };
        if credit > 0 {
            self.ledger.credit(&owner_id, credit).await?;
        }

        tracing::debug!(
            node_id = %proof.node_id,
            proof_hash = %proof.proof_hash,
            bytes = proof.bytes_served,
            points = credit,
            synthetic = proof.synthetic,
            "usage proof generated"
        );

        self.queue.enqueue(proof.clone()).await;
        Ok(proof)
    }
}
