//! # wisp-ledger
//!
//! The points ledger: safe concurrent credit/read/reset of per-user point
//! counters over the shared database connection.
//!
//! Credits from concurrent proof generations must serialize per user, and a
//! settlement snapshot must never run concurrently with a reset of the same
//! account. Both are enforced here with a per-user async lock map shared by
//! every mutation path; the distribution agent goes through this service
//! rather than the database directly.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;
use wisp_types::points::{EligibleUser, PointsSnapshot};
use wisp_types::{unix_now, UserId};

/// Shared handle to the single daemon database connection.
pub type SharedDb = Arc<Mutex<Connection>>;

/// Error types for ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Credit amounts must be positive.
    #[error("credit amount must be positive")]
    ZeroCredit,

    /// Underlying database failure.
    #[error(transparent)]
    Db(#[from] wisp_db::DbError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Per-user serialized points ledger.
pub struct PointsLedger {
    db: SharedDb,
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl PointsLedger {
    /// Create a ledger over the shared connection.
    pub fn new(db: SharedDb) -> Self {
        Self {
            db,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The lock guarding one user's counters. Shared between credit, reset,
    /// and the settlement snapshot.
    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Atomically add `amount` to both counters, creating the account on
    /// first touch. Returns the updated snapshot.
    pub async fn credit(&self, user_id: &str, amount: u64) -> Result<PointsSnapshot> {
        if amount == 0 {
            return Err(LedgerError::ZeroCredit);
        }

        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let conn = self.db.lock().await;
        let snapshot = wisp_db::queries::points::credit_points(&conn, user_id, amount, unix_now())?;
        tracing::debug!(
            user_id,
            amount,
            today = snapshot.today_points,
            epoch = snapshot.epoch_points,
            "points credited"
        );
        Ok(snapshot)
    }

    /// Current snapshot. Unknown users get a zero snapshot, never an error.
    pub async fn read(&self, user_id: &str) -> Result<PointsSnapshot> {
        let conn = self.db.lock().await;
        Ok(wisp_db::queries::points::read_points(&conn, user_id)?)
    }

    /// Conditionally reset `today_points` by subtracting the snapshotted
    /// amount (flooring at zero). `epoch_points` is untouched. Used only by
    /// the distribution agent after a confirmed settlement.
    pub async fn reset_today(&self, user_id: &str, expected: u64) -> Result<()> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let conn = self.db.lock().await;
        wisp_db::queries::points::reset_today_points(&conn, user_id, expected, unix_now())?;
        tracing::debug!(user_id, expected, "today points reset");
        Ok(())
    }

    /// Snapshot all users eligible for distribution, in deterministic order
    /// (points descending, then user id).
    pub async fn snapshot_eligible(&self) -> Result<Vec<EligibleUser>> {
        let conn = self.db.lock().await;
        Ok(wisp_db::queries::points::list_eligible_for_distribution(&conn)?)
    }

    /// Sum of all users' `today_points`, for stats.
    pub async fn total_today_points(&self) -> Result<u64> {
        let conn = self.db.lock().await;
        Ok(wisp_db::queries::points::total_today_points(&conn)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ledger() -> PointsLedger {
        let conn = wisp_db::open_memory().expect("open test db");
        PointsLedger::new(Arc::new(Mutex::new(conn)))
    }

    #[tokio::test]
    async fn test_credit_and_read() {
        let ledger = test_ledger();
        let snap = ledger.credit("u1", 7).await.expect("credit");
        assert_eq!(snap.today_points, 7);
        assert_eq!(snap.epoch_points, 7);

        let read = ledger.read("u1").await.expect("read");
        assert_eq!(read.today_points, 7);
    }

    #[tokio::test]
    async fn test_zero_credit_rejected() {
        let ledger = test_ledger();
        assert!(matches!(
            ledger.credit("u1", 0).await,
            Err(LedgerError::ZeroCredit)
        ));
    }

    #[tokio::test]
    async fn test_read_unknown_is_zero() {
        let ledger = test_ledger();
        let snap = ledger.read("ghost").await.expect("read");
        assert_eq!(snap, PointsSnapshot::zero("ghost"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_credits_no_lost_updates() {
        let ledger = Arc::new(test_ledger());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    ledger.credit("u1", 1).await.expect("credit");
                }
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }

        let snap = ledger.read("u1").await.expect("read");
        assert_eq!(snap.today_points, 200);
        assert_eq!(snap.epoch_points, 200);
    }

    #[tokio::test]
    async fn test_reset_subtracts_snapshot_only() {
        let ledger = test_ledger();
        ledger.credit("u1", 10).await.expect("credit");
        // A credit that lands after the settlement snapshot was taken.
        ledger.credit("u1", 5).await.expect("late credit");

        ledger.reset_today("u1", 10).await.expect("reset");

        let snap = ledger.read("u1").await.expect("read");
        assert_eq!(snap.today_points, 5);
        assert_eq!(snap.epoch_points, 15);
    }
}
