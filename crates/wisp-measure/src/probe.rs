//! Bandwidth probe strategies.
//!
//! A probe turns one active node into one [`ContributionSample`]. The real
//! [`InterfaceProbe`] reads OS interface counters; the [`SyntheticProbe`]
//! produces bounded-random samples and is both the development default and
//! the per-node fallback when a real measurement is unavailable. Synthetic
//! samples are flagged so their proofs stay distinguishable for audit.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use rand::Rng;
use wisp_types::node::Node;
use wisp_types::sample::{ContributionSample, SampleSource};
use wisp_types::unix_now;

use crate::{MeasureError, Result};

/// Default upper bound for synthetic samples: 64 MiB per tick.
pub const DEFAULT_MAX_SYNTHETIC_BYTES: u64 = 64 * 1024 * 1024;

/// One bandwidth measurement strategy.
#[async_trait]
pub trait ContributionProbe: Send + Sync {
    /// Produce one sample for the given node.
    async fn probe(&self, node: &Node) -> Result<ContributionSample>;
}

/// A fresh session id, unique per sample.
pub fn fresh_session_id() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

/// Bounded-random synthetic probe.
///
/// Byte counts land in `[0, max_bytes]`, uptime in `[90, 100]`, with
/// plausible link-speed and latency figures. Documented simulation, not a
/// measurement.
#[derive(Debug)]
pub struct SyntheticProbe {
    max_bytes: u64,
}

impl SyntheticProbe {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

impl Default for SyntheticProbe {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SYNTHETIC_BYTES)
    }
}

#[async_trait]
impl ContributionProbe for SyntheticProbe {
    async fn probe(&self, node: &Node) -> Result<ContributionSample> {
        let mut rng = rand::thread_rng();
        Ok(ContributionSample {
            node_id: node.node_id.clone(),
            session_id: fresh_session_id(),
            timestamp: unix_now(),
            bytes_served: rng.gen_range(0..=self.max_bytes),
            uptime_percent: rng.gen_range(90.0..=100.0),
            download_mbps: rng.gen_range(10.0..=250.0),
            upload_mbps: rng.gen_range(5.0..=100.0),
            latency_ms: rng.gen_range(5.0..=80.0),
            source: SampleSource::Synthetic,
        })
    }
}

/// Real probe reading OS network-interface byte counters.
///
/// Samples the interface's cumulative tx/rx counters and reports the delta
/// since the previous probe as bytes served. The first probe establishes the
/// baseline and reports zero bytes.
pub struct InterfaceProbe {
    stats_dir: PathBuf,
    last: Mutex<Option<(u64, Instant)>>,
}

impl InterfaceProbe {
    /// Probe the named interface (e.g. `eth0`).
    pub fn new(interface: &str) -> Self {
        Self {
            stats_dir: PathBuf::from(format!("/sys/class/net/{interface}/statistics")),
            last: Mutex::new(None),
        }
    }

    fn read_counter(&self, name: &str) -> Result<u64> {
        let path = self.stats_dir.join(name);
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| MeasureError::ProbeFailed(format!("read {}: {e}", path.display())))?;
        raw.trim()
            .parse::<u64>()
            .map_err(|e| MeasureError::ProbeFailed(format!("parse {}: {e}", path.display())))
    }
}

#[async_trait]
impl ContributionProbe for InterfaceProbe {
    async fn probe(&self, node: &Node) -> Result<ContributionSample> {
        let total = self.read_counter("tx_bytes")? + self.read_counter("rx_bytes")?;
        let now = Instant::now();

        let (bytes_served, mbps) = {
            let mut last = match self.last.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let delta = match *last {
                Some((prev_total, prev_at)) => {
                    let bytes = total.saturating_sub(prev_total);
                    let secs = now.duration_since(prev_at).as_secs_f64().max(1e-3);
                    (bytes, bytes as f64 * 8.0 / secs / 1_000_000.0)
                }
                None => (0, 0.0),
            };
            *last = Some((total, now));
            delta
        };

        Ok(ContributionSample {
            node_id: node.node_id.clone(),
            session_id: fresh_session_id(),
            timestamp: unix_now(),
            bytes_served,
            uptime_percent: 100.0,
            download_mbps: mbps,
            upload_mbps: mbps,
            latency_ms: 0.0,
            source: SampleSource::Measured,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node() -> Node {
        Node {
            node_id: "n1".into(),
            owner_id: "u1".into(),
            active: true,
            total_bytes_served: 0,
            total_uptime_accum: 0.0,
            sample_count: 0,
            last_activity_at: 0,
            registered_at: 0,
        }
    }

    #[tokio::test]
    async fn test_synthetic_within_bounds() {
        let probe = SyntheticProbe::new(1_000);
        for _ in 0..50 {
            let sample = probe.probe(&test_node()).await.expect("probe");
            assert!(sample.bytes_served <= 1_000);
            assert!(sample.uptime_percent >= 90.0 && sample.uptime_percent <= 100.0);
            assert!(sample.is_synthetic());
        }
    }

    #[tokio::test]
    async fn test_synthetic_fresh_sessions() {
        let probe = SyntheticProbe::default();
        let a = probe.probe(&test_node()).await.expect("probe");
        let b = probe.probe(&test_node()).await.expect("probe");
        assert_ne!(a.session_id, b.session_id);
    }

    #[tokio::test]
    async fn test_interface_probe_missing_interface() {
        let probe = InterfaceProbe::new("wisp-does-not-exist0");
        assert!(probe.probe(&test_node()).await.is_err());
    }
}
