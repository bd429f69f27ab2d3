//! Ephemeral measurement samples.

use serde::{Deserialize, Serialize};

use crate::NodeId;

/// Where a sample came from.
///
/// Synthetic samples are produced by the bounded-random fallback probe when a
/// real bandwidth measurement is unavailable. The flag is carried through to
/// the stored proof so fallback contributions stay auditable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleSource {
    /// Measured against a real bandwidth probe.
    Measured,
    /// Simulated by the synthetic fallback probe.
    Synthetic,
}

/// One measurement of a node's contribution, produced once per tick per
/// active node. Consumed immediately by proof generation; never persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContributionSample {
    pub node_id: NodeId,
    /// Fresh per sample.
    pub session_id: String,
    /// Unix seconds at measurement time.
    pub timestamp: u64,
    pub bytes_served: u64,
    /// Uptime percentage in [0, 100].
    pub uptime_percent: f64,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub latency_ms: f64,
    pub source: SampleSource,
}

impl ContributionSample {
    /// Whether this sample came from the synthetic fallback probe.
    pub fn is_synthetic(&self) -> bool {
        self.source == SampleSource::Synthetic
    }
}
