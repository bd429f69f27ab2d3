//! Points account query functions.
//!
//! Each mutation is a single SQL statement. Callers that need read-modify-write
//! semantics across statements (credit vs. snapshot vs. reset for one user) go
//! through the `wisp-ledger` per-user locks.

use rusqlite::{Connection, OptionalExtension};
use wisp_types::points::{EligibleUser, PointsSnapshot};

use crate::{DbError, Result};

/// Atomically add `amount` to both counters, creating the account on first
/// touch, and return the updated snapshot.
pub fn credit_points(
    conn: &Connection,
    user_id: &str,
    amount: u64,
    now: u64,
) -> Result<PointsSnapshot> {
    if amount == 0 {
        return Err(DbError::Constraint("credit amount must be positive".into()));
    }

    super::users::upsert_user(conn, user_id, now)?;
    conn.execute(
        "INSERT INTO points_accounts (user_id, epoch_points, today_points, last_updated_at)
         VALUES (?1, ?2, ?2, ?3)
         ON CONFLICT(user_id) DO UPDATE SET
             epoch_points = epoch_points + ?2,
             today_points = today_points + ?2,
             last_updated_at = ?3",
        rusqlite::params![user_id, amount as i64, now as i64],
    )?;

    read_points(conn, user_id)
}

/// Current snapshot for a user. Unknown users get a zero snapshot.
pub fn read_points(conn: &Connection, user_id: &str) -> Result<PointsSnapshot> {
    let snapshot = conn
        .query_row(
            "SELECT user_id, epoch_points, today_points, last_updated_at
             FROM points_accounts WHERE user_id = ?1",
            [user_id],
            |row| {
                Ok(PointsSnapshot {
                    user_id: row.get(0)?,
                    epoch_points: row.get::<_, i64>(1)? as u64,
                    today_points: row.get::<_, i64>(2)? as u64,
                    last_updated_at: row.get::<_, i64>(3)? as u64,
                })
            },
        )
        .optional()?;

    Ok(snapshot.unwrap_or_else(|| PointsSnapshot::zero(user_id)))
}

/// Conditionally reset `today_points` by subtracting the snapshotted amount,
/// flooring at zero. `epoch_points` is untouched.
///
/// Subtraction rather than a blind zero: points credited between the
/// settlement snapshot and this reset survive.
pub fn reset_today_points(conn: &Connection, user_id: &str, expected: u64, now: u64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE points_accounts SET
             today_points = MAX(today_points - ?1, 0),
             last_updated_at = ?2
         WHERE user_id = ?3",
        rusqlite::params![expected as i64, now as i64, user_id],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("points account {user_id}")));
    }
    Ok(())
}

/// Users eligible for settlement: positive `today_points` and a registered
/// payout address. Deterministic order: points descending, then user id.
pub fn list_eligible_for_distribution(conn: &Connection) -> Result<Vec<EligibleUser>> {
    let mut stmt = conn.prepare(
        "SELECT p.user_id, u.payout_address, p.today_points
         FROM points_accounts p
         JOIN users u ON u.user_id = p.user_id
         WHERE p.today_points > 0
           AND u.payout_address IS NOT NULL
           AND u.payout_address != ''
         ORDER BY p.today_points DESC, p.user_id ASC",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(EligibleUser {
                user_id: row.get(0)?,
                payout_address: row.get(1)?,
                today_points: row.get::<_, i64>(2)? as u64,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Sum of all users' `today_points`.
pub fn total_today_points(conn: &Connection) -> Result<u64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(today_points), 0) FROM points_accounts",
        [],
        |row| row.get(0),
    )?;
    Ok(total as u64)
}
