//! Node registry and counter query functions.

use rusqlite::{Connection, OptionalExtension};
use wisp_types::node::Node;

use crate::{DbError, Result};

/// Register a node if absent and return it. Existing nodes are returned as-is
/// (registration is idempotent).
pub fn create_or_get_node(
    conn: &Connection,
    node_id: &str,
    owner_id: &str,
    now: u64,
) -> Result<Node> {
    super::users::upsert_user(conn, owner_id, now)?;
    conn.execute(
        "INSERT OR IGNORE INTO nodes (node_id, owner_id, registered_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![node_id, owner_id, now as i64],
    )?;
    get_node(conn, node_id)
}

/// Fetch a node by id.
pub fn get_node(conn: &Connection, node_id: &str) -> Result<Node> {
    conn.query_row(
        "SELECT node_id, owner_id, active, total_bytes_served, total_uptime_accum,
                sample_count, last_activity_at, registered_at
         FROM nodes WHERE node_id = ?1",
        [node_id],
        row_to_node,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("node {node_id}")))
}

/// List active nodes, optionally restricted to one owner.
pub fn list_active_nodes(conn: &Connection, owner_id: Option<&str>) -> Result<Vec<Node>> {
    let base = "SELECT node_id, owner_id, active, total_bytes_served, total_uptime_accum,
                       sample_count, last_activity_at, registered_at
                FROM nodes WHERE active = 1";

    let rows = match owner_id {
        Some(owner) => {
            let mut stmt = conn.prepare(&format!("{base} AND owner_id = ?1 ORDER BY node_id"))?;
            let rows = stmt
                .query_map([owner], row_to_node)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!("{base} ORDER BY node_id"))?;
            let rows = stmt
                .query_map([], row_to_node)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
    };

    Ok(rows)
}

/// Fold one sample into a node's counters.
///
/// A single UPDATE, so concurrent measurement ticks cannot lose updates.
/// `total_bytes_served` only ever increases.
pub fn update_node_counters(
    conn: &Connection,
    node_id: &str,
    delta_bytes: u64,
    delta_uptime: f64,
    now: u64,
) -> Result<()> {
    let updated = conn.execute(
        "UPDATE nodes SET
             total_bytes_served = total_bytes_served + ?1,
             total_uptime_accum = total_uptime_accum + ?2,
             sample_count = sample_count + 1,
             last_activity_at = ?3
         WHERE node_id = ?4",
        rusqlite::params![delta_bytes as i64, delta_uptime, now as i64, node_id],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("node {node_id}")));
    }
    Ok(())
}

/// Toggle a node's active flag. Nodes are never hard-deleted.
pub fn set_node_active(conn: &Connection, node_id: &str, active: bool) -> Result<()> {
    let updated = conn.execute(
        "UPDATE nodes SET active = ?1 WHERE node_id = ?2",
        rusqlite::params![active as i64, node_id],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("node {node_id}")));
    }
    Ok(())
}

/// Aggregate network counters.
#[derive(Clone, Debug, Default)]
pub struct NetworkTotals {
    pub total_nodes: u64,
    pub active_nodes: u64,
    pub total_bytes_served: u64,
}

/// Network-wide node totals for stats reporting.
pub fn network_totals(conn: &Connection) -> Result<NetworkTotals> {
    conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(active), 0),
                COALESCE(SUM(total_bytes_served), 0)
         FROM nodes",
        [],
        |row| {
            Ok(NetworkTotals {
                total_nodes: row.get::<_, i64>(0)? as u64,
                active_nodes: row.get::<_, i64>(1)? as u64,
                total_bytes_served: row.get::<_, i64>(2)? as u64,
            })
        },
    )
    .map_err(DbError::Sqlite)
}

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<Node> {
    Ok(Node {
        node_id: row.get(0)?,
        owner_id: row.get(1)?,
        active: row.get::<_, i64>(2)? != 0,
        total_bytes_served: row.get::<_, i64>(3)? as u64,
        total_uptime_accum: row.get(4)?,
        sample_count: row.get::<_, i64>(5)? as u64,
        last_activity_at: row.get::<_, i64>(6)? as u64,
        registered_at: row.get::<_, i64>(7)? as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    #[test]
    fn test_create_or_get_idempotent() {
        let conn = test_db();
        let first = create_or_get_node(&conn, "n1", "u1", 100).expect("create");
        let second = create_or_get_node(&conn, "n1", "u1", 200).expect("get");
        assert_eq!(first.registered_at, 100);
        assert_eq!(second.registered_at, 100);
        assert!(first.active);
    }

    #[test]
    fn test_counters_accumulate() {
        let conn = test_db();
        create_or_get_node(&conn, "n1", "u1", 100).expect("create");

        update_node_counters(&conn, "n1", 1000, 90.0, 110).expect("first");
        update_node_counters(&conn, "n1", 500, 80.0, 120).expect("second");

        let node = get_node(&conn, "n1").expect("get");
        assert_eq!(node.total_bytes_served, 1500);
        assert!((node.total_uptime_accum - 170.0).abs() < 1e-9);
        assert_eq!(node.sample_count, 2);
        assert_eq!(node.last_activity_at, 120);
    }

    #[test]
    fn test_counters_unknown_node() {
        let conn = test_db();
        assert!(update_node_counters(&conn, "missing", 1, 1.0, 1).is_err());
    }

    #[test]
    fn test_list_active_filters() {
        let conn = test_db();
        create_or_get_node(&conn, "n1", "u1", 100).expect("create");
        create_or_get_node(&conn, "n2", "u1", 100).expect("create");
        create_or_get_node(&conn, "n3", "u2", 100).expect("create");
        set_node_active(&conn, "n2", false).expect("deactivate");

        let all = list_active_nodes(&conn, None).expect("list");
        assert_eq!(
            all.iter().map(|n| n.node_id.as_str()).collect::<Vec<_>>(),
            vec!["n1", "n3"]
        );

        let owned = list_active_nodes(&conn, Some("u1")).expect("list owned");
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].node_id, "n1");
    }

    #[test]
    fn test_network_totals() {
        let conn = test_db();
        create_or_get_node(&conn, "n1", "u1", 100).expect("create");
        create_or_get_node(&conn, "n2", "u2", 100).expect("create");
        update_node_counters(&conn, "n1", 2048, 99.0, 110).expect("update");
        set_node_active(&conn, "n2", false).expect("deactivate");

        let totals = network_totals(&conn).expect("totals");
        assert_eq!(totals.total_nodes, 2);
        assert_eq!(totals.active_nodes, 1);
        assert_eq!(totals.total_bytes_served, 2048);
    }
}
