//! # wisp-measure
//!
//! The contribution measurement loop: probes every active node once per tick,
//! turns samples into hash-bound usage proofs, credits points, and hands
//! proofs to the submission queue.
//!
//! Probes for different nodes run concurrently; a slow or failing node is
//! skipped for the tick (or falls back to the synthetic probe), never blocking
//! the others. Points are credited at measurement time — an anchoring failure
//! later never claws them back.
//!
//! ## Modules
//!
//! - [`probe`] — `ContributionProbe` strategy trait, synthetic + interface probes
//! - [`measurer`] — per-tick fan-out with bounded per-probe timeouts
//! - [`generator`] — sample → proof → credit → enqueue pipeline

pub mod generator;
pub mod measurer;
pub mod probe;

/// Error types for measurement operations.
#[derive(Debug, thiserror::Error)]
pub enum MeasureError {
    /// The node is not registered.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// The node is registered but disabled.
    #[error("node inactive: {0}")]
    NodeInactive(String),

    /// A probe did not complete within its deadline. Non-fatal; the node's
    /// sample is dropped for the tick.
    #[error("probe timed out for node {node_id} after {seconds}s")]
    ProbeTimeout {
        /// The node whose probe timed out.
        node_id: String,
        /// The deadline that elapsed.
        seconds: u64,
    },

    /// A probe failed to produce a sample.
    #[error("probe failed: {0}")]
    ProbeFailed(String),

    /// Underlying database failure.
    #[error(transparent)]
    Db(#[from] wisp_db::DbError),

    /// Underlying ledger failure.
    #[error(transparent)]
    Ledger(#[from] wisp_ledger::LedgerError),
}

pub type Result<T> = std::result::Result<T, MeasureError>;
