//! Registered contribution nodes.

use serde::{Deserialize, Serialize};

use crate::{NodeId, UserId};

/// A registered bandwidth-sharing node.
///
/// Counters are mutated exclusively by the measurement loop;
/// `total_bytes_served` only ever increases. Nodes are soft-disabled via
/// [`active`](Node::active) and never hard-deleted while proofs reference them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub node_id: NodeId,
    pub owner_id: UserId,
    pub active: bool,
    /// Lifetime bytes served. Monotonic.
    pub total_bytes_served: u64,
    /// Sum of sampled uptime percentages. Divide by `sample_count` for the
    /// average; this is an accumulator, not an average.
    pub total_uptime_accum: f64,
    /// Number of samples folded into `total_uptime_accum`.
    pub sample_count: u64,
    /// Unix seconds of the last recorded sample.
    pub last_activity_at: u64,
    /// Unix seconds of registration.
    pub registered_at: u64,
}

impl Node {
    /// Average uptime percentage over all recorded samples, or 0 if none.
    pub fn average_uptime(&self) -> f64 {
        if self.sample_count == 0 {
            0.0
        } else {
            self.total_uptime_accum / self.sample_count as f64
        }
    }
}
