//! Durable usage proofs.

use serde::{Deserialize, Serialize};

use crate::NodeId;

/// An append-only record attesting to one measured contribution.
///
/// `proof_hash` is a pure function of `(node_id, session_id, timestamp,
/// bytes_served)`, so re-submitting the same proof is idempotent downstream.
/// `settlement_tx_id` stays `None` until the submission queue anchors the
/// proof on the settlement layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UsageProof {
    pub node_id: NodeId,
    pub session_id: String,
    pub timestamp: u64,
    pub bytes_served: u64,
    pub uptime_percent: f64,
    /// True when the underlying sample came from the synthetic fallback probe.
    pub synthetic: bool,
    /// Hex-encoded BLAKE3 digest over the canonical proof encoding.
    pub proof_hash: String,
    /// Transaction id from anchoring, once confirmed.
    pub settlement_tx_id: Option<String>,
}

impl UsageProof {
    /// Whether this proof has been anchored on the settlement layer.
    pub fn is_anchored(&self) -> bool {
        self.settlement_tx_id.is_some()
    }
}
