//! SQL schema definitions.

/// Complete schema for the Wisp v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Users & payout addresses
-- ============================================================

CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    payout_address TEXT,
    registered_at INTEGER NOT NULL
);

-- ============================================================
-- Contribution nodes
-- ============================================================

CREATE TABLE IF NOT EXISTS nodes (
    node_id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL REFERENCES users(user_id),
    active INTEGER NOT NULL DEFAULT 1,
    total_bytes_served INTEGER NOT NULL DEFAULT 0,
    total_uptime_accum REAL NOT NULL DEFAULT 0,
    sample_count INTEGER NOT NULL DEFAULT 0,
    last_activity_at INTEGER NOT NULL DEFAULT 0,
    registered_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_nodes_owner ON nodes(owner_id);
CREATE INDEX IF NOT EXISTS idx_nodes_active ON nodes(active);

-- ============================================================
-- Usage proofs (append-only)
-- ============================================================

CREATE TABLE IF NOT EXISTS usage_proofs (
    proof_hash TEXT PRIMARY KEY,
    node_id TEXT NOT NULL REFERENCES nodes(node_id),
    session_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    bytes_served INTEGER NOT NULL,
    uptime_percent REAL NOT NULL,
    synthetic INTEGER NOT NULL DEFAULT 0,
    settlement_tx_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_proofs_node ON usage_proofs(node_id);
CREATE INDEX IF NOT EXISTS idx_proofs_unanchored
    ON usage_proofs(timestamp) WHERE settlement_tx_id IS NULL;

-- ============================================================
-- Points accounts
-- ============================================================

CREATE TABLE IF NOT EXISTS points_accounts (
    user_id TEXT PRIMARY KEY REFERENCES users(user_id),
    epoch_points INTEGER NOT NULL DEFAULT 0,
    today_points INTEGER NOT NULL DEFAULT 0,
    last_updated_at INTEGER NOT NULL DEFAULT 0
);

-- ============================================================
-- Settlement log (one row per distribution cycle)
-- ============================================================

CREATE TABLE IF NOT EXISTS settlements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_id TEXT NOT NULL,
    status TEXT NOT NULL,
    total_users INTEGER NOT NULL DEFAULT 0,
    total_points INTEGER NOT NULL DEFAULT 0,
    total_amount INTEGER NOT NULL DEFAULT 0,
    user_share INTEGER NOT NULL DEFAULT 0,
    charity_share INTEGER NOT NULL DEFAULT 0,
    tx_id TEXT,
    error TEXT,
    executed_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_settlements_batch ON settlements(batch_id);

-- ============================================================
-- Settings
-- ============================================================

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
