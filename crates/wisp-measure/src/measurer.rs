//! Per-tick measurement fan-out.
//!
//! Each tick probes every active node concurrently, bounded by a per-probe
//! timeout. A slow or failing probe falls back to the synthetic probe (when
//! enabled) or drops that node's sample for the tick; either way the rest of
//! the tick proceeds. Samples are handed to the proof pipeline as their
//! probes complete, so each node's proofs stay in timestamp order.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use wisp_ledger::SharedDb;
use wisp_types::node::Node;
use wisp_types::proof::UsageProof;
use wisp_types::sample::ContributionSample;

use crate::generator::ProofGenerator;
use crate::probe::{ContributionProbe, SyntheticProbe};
use crate::{MeasureError, Result};

/// Default per-probe deadline.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(20);

/// Outcome counts for one measurement tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Nodes that produced a proof this tick.
    pub measured: usize,
    /// Of those, how many used the synthetic fallback.
    pub synthetic: usize,
    /// Nodes skipped (probe timeout/failure with fallback disabled, or a
    /// pipeline rejection).
    pub skipped: usize,
}

/// The contribution measurer.
pub struct Measurer {
    db: SharedDb,
    probe: Arc<dyn ContributionProbe>,
    /// Fallback for failed probes; `None` disables fallback (failed nodes
    /// are skipped for the tick).
    fallback: Option<Arc<SyntheticProbe>>,
    generator: ProofGenerator,
    probe_timeout: Duration,
}

impl Measurer {
    pub fn new(
        db: SharedDb,
        probe: Arc<dyn ContributionProbe>,
        fallback: Option<Arc<SyntheticProbe>>,
        generator: ProofGenerator,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            db,
            probe,
            fallback,
            generator,
            probe_timeout,
        }
    }

    /// Run one measurement tick over every active node.
    ///
    /// Probe failures never fail the tick; the summary records what was
    /// measured and what was skipped.
    pub async fn tick(&self) -> Result<TickSummary> {
        let nodes = {
            let conn = self.db.lock().await;
            wisp_db::queries::nodes::list_active_nodes(&conn, None)?
        };

        let mut summary = TickSummary::default();
        let mut probes: JoinSet<Option<ContributionSample>> = JoinSet::new();
        for node in nodes {
            let probe = Arc::clone(&self.probe);
            let fallback = self.fallback.clone();
            let timeout = self.probe_timeout;
            probes.spawn(async move { probe_one(probe, fallback, timeout, node).await });
        }

        while let Some(joined) = probes.join_next().await {
            let Ok(sample) = joined else {
                // A panicked probe task only loses its own sample.
                summary.skipped += 1;
                continue;
            };
            match sample {
                Some(sample) => {
                    let synthetic = sample.is_synthetic();
                    match self.generator.generate(sample).await {
                        Ok(_) => {
                            summary.measured += 1;
                            if synthetic {
                                summary.synthetic += 1;
                            }
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "sample rejected by proof pipeline");
                            summary.skipped += 1;
                        }
                    }
                }
                None => summary.skipped += 1,
            }
        }

        tracing::info!(
            measured = summary.measured,
            synthetic = summary.synthetic,
            skipped = summary.skipped,
            "measurement tick complete"
        );
        Ok(summary)
    }

    /// Measure a single node on demand.
    ///
    /// Probe failures degrade (fallback or `Ok(None)`), they never propagate;
    /// unknown or inactive nodes are rejected.
    pub async fn measure_once(&self, node_id: &str) -> Result<Option<UsageProof>> {
        let node = {
            let conn = self.db.lock().await;
            match wisp_db::queries::nodes::get_node(&conn, node_id) {
                Ok(node) => node,
                Err(wisp_db::DbError::NotFound(_)) => {
                    return Err(MeasureError::NodeNotFound(node_id.to_string()))
                }
                Err(e) => return Err(e.into()),
            }
        };
        if !node.active {
            return Err(MeasureError::NodeInactive(node_id.to_string()));
        }

        let sample = probe_one(
            Arc::clone(&self.probe),
            self.fallback.clone(),
            self.probe_timeout,
            node,
        )
        .await;

        match sample {
            Some(sample) => Ok(Some(self.generator.generate(sample).await?)),
            None => Ok(None),
        }
    }
}

/// Probe one node with a deadline, falling back to the synthetic probe on
/// timeout or failure.
async fn probe_one(
    probe: Arc<dyn ContributionProbe>,
    fallback: Option<Arc<SyntheticProbe>>,
    timeout: Duration,
    node: Node,
) -> Option<ContributionSample> {
    let attempt = tokio::time::timeout(timeout, probe.probe(&node)).await;
    match attempt {
        Ok(Ok(sample)) => Some(sample),
        Ok(Err(err)) => {
            tracing::warn!(node_id = %node.node_id, error = %err, "probe failed");
            fallback_sample(fallback, &node, timeout).await
        }
        Err(_elapsed) => {
            tracing::warn!(
                node_id = %node.node_id,
                seconds = timeout.as_secs(),
                "probe timed out"
            );
            fallback_sample(fallback, &node, timeout).await
        }
    }
}

async fn fallback_sample(
    fallback: Option<Arc<SyntheticProbe>>,
    node: &Node,
    timeout: Duration,
) -> Option<ContributionSample> {
    let fallback = fallback?;
    match tokio::time::timeout(timeout, fallback.probe(node)).await {
        Ok(Ok(sample)) => Some(sample),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex;
    use wisp_gateway::stub::StubGateway;
    use wisp_ledger::PointsLedger;
    use wisp_queue::SubmissionQueue;
    use wisp_types::sample::SampleSource;
    use wisp_types::unix_now;

    /// Probe returning a fixed byte count per call.
    struct FixedProbe {
        bytes: u64,
    }

    #[async_trait]
    impl ContributionProbe for FixedProbe {
        async fn probe(&self, node: &Node) -> Result<ContributionSample> {
            Ok(ContributionSample {
                node_id: node.node_id.clone(),
                session_id: crate::probe::fresh_session_id(),
                timestamp: unix_now(),
                bytes_served: self.bytes,
                uptime_percent: 95.0,
                download_mbps: 50.0,
                upload_mbps: 20.0,
                latency_ms: 10.0,
                source: SampleSource::Measured,
            })
        }
    }

    /// Probe that fails for one node and succeeds for the rest.
    struct FlakyProbe {
        failing_node: String,
        inner: FixedProbe,
    }

    #[async_trait]
    impl ContributionProbe for FlakyProbe {
        async fn probe(&self, node: &Node) -> Result<ContributionSample> {
            if node.node_id == self.failing_node {
                return Err(MeasureError::ProbeFailed("flaky".into()));
            }
            self.inner.probe(node).await
        }
    }

    fn build_measurer(
        probe: Arc<dyn ContributionProbe>,
        fallback: Option<Arc<SyntheticProbe>>,
    ) -> (Measurer, SharedDb, Arc<PointsLedger>) {
        let conn = wisp_db::open_memory().expect("open test db");
        for (node, owner) in [("n1", "u1"), ("n2", "u2")] {
            wisp_db::queries::nodes::create_or_get_node(&conn, node, owner, 100).expect("node");
        }
        let db: SharedDb = Arc::new(Mutex::new(conn));
        let ledger = Arc::new(PointsLedger::new(db.clone()));
        let queue = Arc::new(SubmissionQueue::new(
            Arc::new(StubGateway::new()),
            db.clone(),
            Duration::from_secs(60),
        ));
        let generator = ProofGenerator::new(db.clone(), ledger.clone(), queue, true);
        let measurer = Measurer::new(db.clone(), probe, fallback, generator, Duration::from_secs(2));
        (measurer, db, ledger)
    }

    #[tokio::test]
    async fn test_tick_measures_all_active_nodes() {
        let (measurer, db, ledger) = build_measurer(
            Arc::new(FixedProbe { bytes: 3 * 1_048_576 }),
            None,
        );

        let summary = measurer.tick().await.expect("tick");
        assert_eq!(summary, TickSummary { measured: 2, synthetic: 0, skipped: 0 });

        // Each owner earned 3 points from their node.
        assert_eq!(ledger.read("u1").await.expect("read").today_points, 3);
        assert_eq!(ledger.read("u2").await.expect("read").today_points, 3);

        let conn = db.lock().await;
        for node_id in ["n1", "n2"] {
            let node = wisp_db::queries::nodes::get_node(&conn, node_id).expect("node");
            assert_eq!(node.total_bytes_served, 3 * 1_048_576);
            assert_eq!(node.sample_count, 1);
        }
    }

    #[tokio::test]
    async fn test_tick_counters_accumulate_across_ticks() {
        let (measurer, db, _ledger) = build_measurer(
            Arc::new(FixedProbe { bytes: 1_048_576 }),
            None,
        );

        for _ in 0..3 {
            measurer.tick().await.expect("tick");
        }

        let conn = db.lock().await;
        let node = wisp_db::queries::nodes::get_node(&conn, "n1").expect("node");
        assert_eq!(node.total_bytes_served, 3 * 1_048_576);
        assert_eq!(node.sample_count, 3);
    }

    #[tokio::test]
    async fn test_failing_probe_skips_only_that_node() {
        let probe = FlakyProbe {
            failing_node: "n1".into(),
            inner: FixedProbe { bytes: 2 * 1_048_576 },
        };
        let (measurer, _db, ledger) = build_measurer(Arc::new(probe), None);

        let summary = measurer.tick().await.expect("tick");
        assert_eq!(summary.measured, 1);
        assert_eq!(summary.skipped, 1);

        assert_eq!(ledger.read("u1").await.expect("read").today_points, 0);
        assert_eq!(ledger.read("u2").await.expect("read").today_points, 2);
    }

    #[tokio::test]
    async fn test_failing_probe_falls_back_to_synthetic() {
        let probe = FlakyProbe {
            failing_node: "n1".into(),
            inner: FixedProbe { bytes: 2 * 1_048_576 },
        };
        let (measurer, db, _ledger) =
            build_measurer(Arc::new(probe), Some(Arc::new(SyntheticProbe::new(1_000))));

        let summary = measurer.tick().await.expect("tick");
        assert_eq!(summary.measured, 2);
        assert_eq!(summary.synthetic, 1);
        assert_eq!(summary.skipped, 0);

        // The fallback proof is flagged synthetic.
        let conn = db.lock().await;
        let pending = wisp_db::queries::proofs::unanchored_proofs(&conn, 10).expect("list");
        assert_eq!(pending.iter().filter(|p| p.synthetic).count(), 1);
    }

    #[tokio::test]
    async fn test_measure_once_unknown_node() {
        let (measurer, _db, _ledger) =
            build_measurer(Arc::new(FixedProbe { bytes: 1_048_576 }), None);
        assert!(matches!(
            measurer.measure_once("ghost").await,
            Err(MeasureError::NodeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_measure_once_produces_proof() {
        let (measurer, _db, ledger) =
            build_measurer(Arc::new(FixedProbe { bytes: 5 * 1_048_576 }), None);

        let proof = measurer
            .measure_once("n1")
            .await
            .expect("measure")
            .expect("sample produced");
        assert_eq!(proof.bytes_served, 5 * 1_048_576);
        assert_eq!(ledger.read("u1").await.expect("read").today_points, 5);
    }
}
