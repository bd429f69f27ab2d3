//! Settlement log query functions.
//!
//! Append-only, usually one row per cycle outcome. A `submitted` row lands
//! after the gateway confirms the batch payment and before counters reset;
//! the matching `confirmed` row lands after the reset. A retried cycle whose
//! snapshot matches a dangling `submitted` row skips payment and performs
//! only the withheld reset.

use rusqlite::{Connection, OptionalExtension};

use crate::Result;

/// One settlement log row.
#[derive(Clone, Debug)]
pub struct SettlementRow {
    pub batch_id: String,
    pub status: String,
    pub total_users: u64,
    pub total_points: u64,
    pub total_amount: u64,
    pub user_share: u64,
    pub charity_share: u64,
    pub tx_id: Option<String>,
    pub error: Option<String>,
    pub executed_at: u64,
}

/// Append one cycle's outcome to the settlement log.
#[allow(clippy::too_many_arguments)]
pub fn insert_settlement(conn: &Connection, row: &SettlementRow) -> Result<()> {
    conn.execute(
        "INSERT INTO settlements
             (batch_id, status, total_users, total_points, total_amount,
              user_share, charity_share, tx_id, error, executed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            row.batch_id,
            row.status,
            row.total_users as i64,
            row.total_points as i64,
            row.total_amount as i64,
            row.user_share as i64,
            row.charity_share as i64,
            row.tx_id,
            row.error,
            row.executed_at as i64,
        ],
    )?;
    Ok(())
}

/// The most recent settlement row, if any.
pub fn last_settlement(conn: &Connection) -> Result<Option<SettlementRow>> {
    let row = conn
        .query_row(
            "SELECT batch_id, status, total_users, total_points, total_amount,
                    user_share, charity_share, tx_id, error, executed_at
             FROM settlements ORDER BY id DESC LIMIT 1",
            [],
            row_to_settlement,
        )
        .optional()?;
    Ok(row)
}

/// The most recent settlement row with the given status, if any.
pub fn last_settlement_with_status(
    conn: &Connection,
    status: &str,
) -> Result<Option<SettlementRow>> {
    let row = conn
        .query_row(
            "SELECT batch_id, status, total_users, total_points, total_amount,
                    user_share, charity_share, tx_id, error, executed_at
             FROM settlements WHERE status = ?1 ORDER BY id DESC LIMIT 1",
            [status],
            row_to_settlement,
        )
        .optional()?;
    Ok(row)
}

fn row_to_settlement(row: &rusqlite::Row<'_>) -> rusqlite::Result<SettlementRow> {
    Ok(SettlementRow {
        batch_id: row.get(0)?,
        status: row.get(1)?,
        total_users: row.get::<_, i64>(2)? as u64,
        total_points: row.get::<_, i64>(3)? as u64,
        total_amount: row.get::<_, i64>(4)? as u64,
        user_share: row.get::<_, i64>(5)? as u64,
        charity_share: row.get::<_, i64>(6)? as u64,
        tx_id: row.get(7)?,
        error: row.get(8)?,
        executed_at: row.get::<_, i64>(9)? as u64,
    })
}
