//! User registry query functions.

use rusqlite::Connection;
use rusqlite::OptionalExtension;

use crate::Result;

/// Register a user if absent. Existing rows are untouched.
pub fn upsert_user(conn: &Connection, user_id: &str, registered_at: u64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users (user_id, registered_at) VALUES (?1, ?2)",
        rusqlite::params![user_id, registered_at as i64],
    )?;
    Ok(())
}

/// Set or replace a user's payout address, registering them if needed.
pub fn set_payout_address(
    conn: &Connection,
    user_id: &str,
    payout_address: &str,
    now: u64,
) -> Result<()> {
    upsert_user(conn, user_id, now)?;
    conn.execute(
        "UPDATE users SET payout_address = ?1 WHERE user_id = ?2",
        rusqlite::params![payout_address, user_id],
    )?;
    Ok(())
}

/// Get a user's payout address, if registered.
pub fn payout_address(conn: &Connection, user_id: &str) -> Result<Option<String>> {
    let address: Option<Option<String>> = conn
        .query_row(
            "SELECT payout_address FROM users WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(address.flatten())
}
