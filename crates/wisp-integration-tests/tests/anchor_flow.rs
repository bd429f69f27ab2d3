//! Integration test: Proof anchoring through the submission queue.
//!
//! Exercises the generate -> enqueue -> anchor -> stamp pipeline end to end:
//! 1. Generate proofs through the real pipeline (not hand-built)
//! 2. Run the queue consumer against the stub gateway
//! 3. Verify anchored proofs are stamped with their settlement tx id
//! 4. Inject anchor failures and verify retry with no duplicates
//!
//! This test uses wisp-measure, wisp-queue, wisp-gateway, wisp-ledger, and
//! wisp-db with an in-memory database.

use std::sync::Arc;
use std::time::Duration;

use wisp_gateway::stub::StubGateway;
use wisp_gateway::SettlementGateway;
use wisp_ledger::{PointsLedger, SharedDb};
use wisp_measure::generator::ProofGenerator;
use wisp_queue::SubmissionQueue;
use wisp_types::sample::{ContributionSample, SampleSource};
use wisp_types::BYTES_PER_POINT;

/// Base timestamp for test scenarios.
const BASE_TIME: u64 = 1_700_000_000;

struct Harness {
    db: SharedDb,
    gateway: Arc<StubGateway>,
    queue: Arc<SubmissionQueue>,
    generator: ProofGenerator,
}

fn setup() -> Harness {
    let conn = wisp_db::open_memory().expect("open test db");
    let db: SharedDb = Arc::new(tokio::sync::Mutex::new(conn));
    let ledger = Arc::new(PointsLedger::new(Arc::clone(&db)));
    let gateway = Arc::new(StubGateway::new());
    let gateway_dyn: Arc<dyn SettlementGateway> = Arc::clone(&gateway) as _;
    let queue = Arc::new(SubmissionQueue::new(
        gateway_dyn,
        Arc::clone(&db),
        Duration::from_millis(10),
    ));
    let generator = ProofGenerator::new(Arc::clone(&db), ledger, Arc::clone(&queue), true);
    Harness {
        db,
        gateway,
        queue,
        generator,
    }
}

impl Harness {
    async fn add_node(&self, node_id: &str, owner_id: &str) {
        let conn = self.db.lock().await;
        wisp_db::queries::nodes::create_or_get_node(&conn, node_id, owner_id, BASE_TIME)
            .expect("create node");
    }

    async fn generate(&self, node_id: &str, session_id: &str) -> String {
        let proof = self
            .generator
            .generate(ContributionSample {
                node_id: node_id.to_string(),
                session_id: session_id.to_string(),
                timestamp: BASE_TIME + 60,
                bytes_served: 2 * BYTES_PER_POINT,
                uptime_percent: 98.0,
                download_mbps: 100.0,
                upload_mbps: 30.0,
                latency_ms: 20.0,
                source: SampleSource::Measured,
            })
            .await
            .expect("generate");
        proof.proof_hash
    }

    /// Wait until every listed proof carries a settlement tx id.
    async fn wait_until_anchored(&self, hashes: &[String]) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let all_anchored = {
                    let conn = self.db.lock().await;
                    hashes.iter().all(|hash| {
                        wisp_db::queries::proofs::get_proof(&conn, hash)
                            .map(|proof| proof.is_anchored())
                            .unwrap_or(false)
                    })
                };
                if all_anchored {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("proofs should anchor within the deadline");
    }
}

#[tokio::test]
async fn generated_proofs_are_anchored_and_stamped() {
    let h = setup();
    h.add_node("n1", "alice").await;
    h.queue.start();

    let hash_a = h.generate("n1", "s1").await;
    let hash_b = h.generate("n1", "s2").await;
    h.wait_until_anchored(&[hash_a.clone(), hash_b.clone()]).await;

    assert_eq!(h.gateway.anchor_calls(), 2);
    assert_eq!(h.queue.depth().await, 0);

    let conn = h.db.lock().await;
    let a = wisp_db::queries::proofs::get_proof(&conn, &hash_a).expect("get");
    let b = wisp_db::queries::proofs::get_proof(&conn, &hash_b).expect("get");
    // FIFO: sequential stub tx ids in enqueue order.
    assert!(a.settlement_tx_id < b.settlement_tx_id);
    assert_eq!(
        wisp_db::queries::proofs::unanchored_proofs(&conn, 10)
            .expect("query")
            .len(),
        0
    );
}

#[tokio::test]
async fn anchor_failures_retry_without_duplicates() {
    let h = setup();
    h.add_node("n1", "alice").await;
    h.gateway.fail_next_anchor(2);
    h.queue.start();

    let hash = h.generate("n1", "s1").await;
    h.wait_until_anchored(std::slice::from_ref(&hash)).await;

    // Two injected failures, one success; the proof was re-queued each time,
    // never duplicated.
    assert_eq!(h.gateway.anchor_calls(), 3);
    assert_eq!(h.queue.depth().await, 0);

    let conn = h.db.lock().await;
    let proof = wisp_db::queries::proofs::get_proof(&conn, &hash).expect("get");
    assert_eq!(proof.settlement_tx_id.as_deref(), Some("stub-anchor-000003"));
}

#[tokio::test]
async fn unanchored_proofs_remain_queryable_for_reconciliation() {
    let h = setup();
    h.add_node("n1", "alice").await;
    // Consumer deliberately not started.

    let hash_a = h.generate("n1", "s1").await;
    let hash_b = h.generate("n1", "s2").await;

    let conn = h.db.lock().await;
    let pending = wisp_db::queries::proofs::unanchored_proofs(&conn, 10).expect("query");
    let hashes: Vec<&str> = pending.iter().map(|p| p.proof_hash.as_str()).collect();
    assert_eq!(pending.len(), 2);
    assert!(hashes.contains(&hash_a.as_str()));
    assert!(hashes.contains(&hash_b.as_str()));
    drop(conn);

    assert_eq!(h.queue.depth().await, 2);
    assert!(!h.queue.is_processing());
}
