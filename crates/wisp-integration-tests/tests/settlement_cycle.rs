//! Integration test: Full reward settlement cycles.
//!
//! Exercises the complete credit -> snapshot -> solvency -> batch payout ->
//! conditional reset pipeline:
//! 1. Credit points to users via the shared ledger
//! 2. Run a distribution cycle against the stub gateway
//! 3. Verify payout amounts, the 70/30 split, and the charity remainder
//! 4. Verify counters reset only after a confirmed payout
//! 5. Exercise the failure paths: insufficient treasury, batch failure,
//!    concurrent triggers
//!
//! This test uses wisp-ledger, wisp-distribution, wisp-gateway, and
//! wisp-db with an in-memory database.

use std::sync::Arc;
use std::time::Duration;

use wisp_distribution::agent::{DistributionConfig, RewardAgent};
use wisp_gateway::stub::StubGateway;
use wisp_gateway::SettlementGateway;
use wisp_ledger::{PointsLedger, SharedDb};

/// Base timestamp for test scenarios.
const BASE_TIME: u64 = 1_700_000_000;

struct Harness {
    db: SharedDb,
    ledger: Arc<PointsLedger>,
    gateway: Arc<StubGateway>,
    agent: RewardAgent,
}

fn setup(treasury: u64) -> Harness {
    let conn = wisp_db::open_memory().expect("open test db");
    let db: SharedDb = Arc::new(tokio::sync::Mutex::new(conn));
    let ledger = Arc::new(PointsLedger::new(Arc::clone(&db)));
    let gateway = Arc::new(StubGateway::with_treasury(treasury));
    let gateway_dyn: Arc<dyn SettlementGateway> = Arc::clone(&gateway) as _;
    let agent = RewardAgent::new(
        Arc::clone(&db),
        Arc::clone(&ledger),
        gateway_dyn,
        DistributionConfig::default(),
    )
    .expect("valid default config");

    Harness {
        db,
        ledger,
        gateway,
        agent,
    }
}

impl Harness {
    /// Register a user with a payout address.
    async fn add_user(&self, user_id: &str, address: &str) {
        let conn = self.db.lock().await;
        wisp_db::queries::users::upsert_user(&conn, user_id, BASE_TIME).expect("upsert user");
        wisp_db::queries::users::set_payout_address(&conn, user_id, address, BASE_TIME)
            .expect("set address");
    }
}

#[tokio::test]
async fn single_user_cycle_pays_seventy_thirty() {
    let h = setup(1_000_000_000);
    h.add_user("alice", "wisp1alice").await;

    // 150 points at the default rate of 1,000 micro-wisps per point.
    h.ledger.credit("alice", 150).await.expect("credit");

    let report = h.agent.trigger().await;
    assert!(report.success, "cycle should succeed: {:?}", report.error);
    assert_eq!(report.total_users, 1);
    assert_eq!(report.total_points, 150);
    assert_eq!(report.total_amount, 150_000);
    assert_eq!(report.user_share, 105_000);
    assert_eq!(report.charity_share, 45_000);
    assert!(report.tx_id.is_some());

    // The batch paid only the contributor entry; the charity share remains
    // in the distribution pool.
    let batches = h.gateway.executed_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].0, vec![("wisp1alice".to_string(), 105_000)]);
    assert_eq!(h.gateway.pool_balance(), 45_000);

    // Today's counter is reset; the epoch counter survives.
    let snapshot = h.ledger.read("alice").await.expect("read");
    assert_eq!(snapshot.today_points, 0);
    assert_eq!(snapshot.epoch_points, 150);

    // Settlement log: a `submitted` marker followed by `confirmed`.
    let conn = h.db.lock().await;
    let last = wisp_db::queries::settlements::last_settlement(&conn)
        .expect("query")
        .expect("row");
    assert_eq!(last.status, "confirmed");
    assert_eq!(last.total_amount, 150_000);
    let submitted = wisp_db::queries::settlements::last_settlement_with_status(&conn, "submitted")
        .expect("query")
        .expect("row");
    assert_eq!(submitted.batch_id, last.batch_id);
    assert_eq!(submitted.tx_id, last.tx_id);

    // A confirmed cycle records when it ran.
    let recorded = wisp_db::queries::settings::get(&conn, "last_distribution_at")
        .expect("query")
        .expect("seeded");
    assert_ne!(recorded, "0");
}

#[tokio::test]
async fn multi_user_cycle_orders_and_pays_each() {
    let h = setup(1_000_000_000);
    h.add_user("alice", "wisp1alice").await;
    h.add_user("bob", "wisp1bob").await;
    h.add_user("carol", "wisp1carol").await;

    h.ledger.credit("bob", 30).await.expect("credit");
    h.ledger.credit("alice", 100).await.expect("credit");
    h.ledger.credit("carol", 20).await.expect("credit");

    let report = h.agent.trigger().await;
    assert!(report.success, "cycle should succeed: {:?}", report.error);
    assert_eq!(report.total_users, 3);
    assert_eq!(report.total_points, 150);
    assert_eq!(report.user_share, 105_000);
    assert_eq!(report.charity_share, 45_000);

    // Snapshot order is points-descending, so the batch entries are too.
    let batches = h.gateway.executed_batches();
    assert_eq!(
        batches[0].0,
        vec![
            ("wisp1alice".to_string(), 70_000),
            ("wisp1bob".to_string(), 21_000),
            ("wisp1carol".to_string(), 14_000),
        ]
    );

    for user in ["alice", "bob", "carol"] {
        let snapshot = h.ledger.read(user).await.expect("read");
        assert_eq!(snapshot.today_points, 0, "{user} should be reset");
    }
}

#[tokio::test]
async fn empty_snapshot_is_a_successful_noop() {
    let h = setup(1_000_000_000);

    let report = h.agent.trigger().await;
    assert!(report.success);
    assert_eq!(report.total_users, 0);
    assert_eq!(report.total_amount, 0);
    assert_eq!(h.gateway.fund_calls(), 0);
    assert_eq!(h.gateway.batch_calls(), 0);
}

#[tokio::test]
async fn insufficient_treasury_leaves_points_untouched() {
    // Treasury covers 1 point, not 150.
    let h = setup(1_000);
    h.add_user("alice", "wisp1alice").await;
    h.ledger.credit("alice", 150).await.expect("credit");

    let report = h.agent.trigger().await;
    assert!(!report.success);
    assert!(report.error.is_some());
    assert_eq!(h.gateway.fund_calls(), 0);
    assert_eq!(h.gateway.batch_calls(), 0);

    let snapshot = h.ledger.read("alice").await.expect("read");
    assert_eq!(snapshot.today_points, 150, "points must survive an abort");

    let conn = h.db.lock().await;
    let last = wisp_db::queries::settlements::last_settlement(&conn)
        .expect("query")
        .expect("row");
    assert_eq!(last.status, "failed");
}

#[tokio::test]
async fn failed_batch_keeps_points_and_next_cycle_pays() {
    let h = setup(1_000_000_000);
    h.add_user("alice", "wisp1alice").await;
    h.ledger.credit("alice", 150).await.expect("credit");
    h.gateway.fail_next_batch(1);

    let report = h.agent.trigger().await;
    assert!(!report.success);
    let snapshot = h.ledger.read("alice").await.expect("read");
    assert_eq!(snapshot.today_points, 150);

    // A later cycle over the same snapshot pays normally; the failed cycle
    // never wrote a `submitted` marker.
    let report = h.agent.trigger().await;
    assert!(report.success, "retry should succeed: {:?}", report.error);
    assert_eq!(report.user_share, 105_000);
    let snapshot = h.ledger.read("alice").await.expect("read");
    assert_eq!(snapshot.today_points, 0);
    assert_eq!(h.gateway.batch_calls(), 2);
}

#[tokio::test]
async fn concurrent_trigger_is_rejected() {
    let h = setup(1_000_000_000);
    h.add_user("alice", "wisp1alice").await;
    h.ledger.credit("alice", 150).await.expect("credit");

    // Slow the gateway down so the first cycle is still in flight when the
    // second trigger arrives.
    h.gateway.set_call_delay(Duration::from_millis(200));

    let agent = Arc::new(h.agent);
    let first = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move { agent.trigger().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = agent.trigger().await;
    assert!(!second.success);
    assert!(second.error.is_some());
    assert_eq!(second.total_users, 0);

    let first = first.await.expect("join");
    assert!(first.success, "in-flight cycle unaffected: {:?}", first.error);
    assert_eq!(h.gateway.batch_calls(), 1);
}

#[tokio::test]
async fn late_credit_survives_the_reset() {
    let h = setup(1_000_000_000);
    h.add_user("alice", "wisp1alice").await;
    h.ledger.credit("alice", 150).await.expect("credit");

    // Simulate a credit landing between the snapshot and the reset: the
    // reset subtracts the snapshotted amount instead of zeroing.
    let eligible = h.ledger.snapshot_eligible().await.expect("snapshot");
    assert_eq!(eligible[0].today_points, 150);
    h.ledger.credit("alice", 10).await.expect("late credit");
    h.ledger.reset_today("alice", 150).await.expect("reset");

    let snapshot = h.ledger.read("alice").await.expect("read");
    assert_eq!(snapshot.today_points, 10);
    assert_eq!(snapshot.epoch_points, 160);
}
