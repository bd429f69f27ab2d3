//! Usage proof query functions.

use rusqlite::{Connection, OptionalExtension};
use wisp_types::proof::UsageProof;

use crate::{DbError, Result};

/// Persist a usage proof with no settlement tx id.
///
/// Keyed by `proof_hash`; re-inserting an identical proof is a no-op, which
/// makes duplicate generation harmless.
pub fn insert_proof(conn: &Connection, proof: &UsageProof) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO usage_proofs
             (proof_hash, node_id, session_id, timestamp, bytes_served,
              uptime_percent, synthetic, settlement_tx_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            proof.proof_hash,
            proof.node_id,
            proof.session_id,
            proof.timestamp as i64,
            proof.bytes_served as i64,
            proof.uptime_percent,
            proof.synthetic as i64,
            proof.settlement_tx_id,
        ],
    )?;
    Ok(())
}

/// Stamp a proof with the settlement tx id from anchoring.
///
/// Only stamps unanchored proofs; a second anchor of the same hash keeps the
/// first tx id.
pub fn stamp_proof_settlement(conn: &Connection, proof_hash: &str, tx_id: &str) -> Result<()> {
    let updated = conn.execute(
        "UPDATE usage_proofs SET settlement_tx_id = ?1
         WHERE proof_hash = ?2 AND settlement_tx_id IS NULL",
        rusqlite::params![tx_id, proof_hash],
    )?;
    if updated == 0 {
        tracing::debug!(proof_hash, "proof already stamped or unknown");
    }
    Ok(())
}

/// Fetch a proof by hash.
pub fn get_proof(conn: &Connection, proof_hash: &str) -> Result<UsageProof> {
    conn.query_row(
        "SELECT proof_hash, node_id, session_id, timestamp, bytes_served,
                uptime_percent, synthetic, settlement_tx_id
         FROM usage_proofs WHERE proof_hash = ?1",
        [proof_hash],
        row_to_proof,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("proof {proof_hash}")))
}

/// List proofs that have not been anchored yet, oldest first.
///
/// Used for manual reconciliation after a crash drops queue entries.
pub fn unanchored_proofs(conn: &Connection, limit: u32) -> Result<Vec<UsageProof>> {
    let mut stmt = conn.prepare(
        "SELECT proof_hash, node_id, session_id, timestamp, bytes_served,
                uptime_percent, synthetic, settlement_tx_id
         FROM usage_proofs WHERE settlement_tx_id IS NULL
         ORDER BY timestamp ASC LIMIT ?1",
    )?;

    let rows = stmt
        .query_map([limit], row_to_proof)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Total stored proofs.
pub fn proof_count(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM usage_proofs", [], |row| row.get(0))?;
    Ok(count as u64)
}

fn row_to_proof(row: &rusqlite::Row<'_>) -> rusqlite::Result<UsageProof> {
    Ok(UsageProof {
        proof_hash: row.get(0)?,
        node_id: row.get(1)?,
        session_id: row.get(2)?,
        timestamp: row.get::<_, i64>(3)? as u64,
        bytes_served: row.get::<_, i64>(4)? as u64,
        uptime_percent: row.get(5)?,
        synthetic: row.get::<_, i64>(6)? != 0,
        settlement_tx_id: row.get(7)?,
    })
}
