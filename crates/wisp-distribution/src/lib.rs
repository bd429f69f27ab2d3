//! # wisp-distribution
//!
//! The reward distribution agent: once per period (or on demand), snapshot
//! all eligible point balances, convert points to micro-wisps, verify the
//! treasury can cover the batch, execute one atomic batch settlement, and
//! reset the snapshotted counters only after the gateway confirms.
//!
//! ## Modules
//!
//! - [`split`] — payout split validation and batch computation
//! - [`agent`] — the cycle state machine and scheduler entry points

pub mod agent;
pub mod split;

/// Error types for distribution operations.
#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    /// Split percentages do not sum to 100.
    #[error("split percentages must sum to 100, got {total}")]
    InvalidSplitTotal {
        /// The actual total.
        total: u16,
    },

    /// Arithmetic overflow in payout calculation.
    #[error("arithmetic overflow in payout calculation")]
    Overflow,

    /// The treasury cannot cover the computed batch. Nothing was mutated.
    #[error("insufficient treasury: have {available}, need {required}")]
    InsufficientTreasury {
        /// Current treasury balance in micro-wisps.
        available: u64,
        /// Total batch amount in micro-wisps.
        required: u64,
    },

    /// A gateway call failed or timed out. The cycle aborts without
    /// resetting any counters.
    #[error("gateway failure: {0}")]
    GatewayFailure(String),

    /// A cycle is already in flight; the trigger was rejected, not queued.
    #[error("distribution already running")]
    AlreadyRunning,

    /// Underlying ledger failure.
    #[error(transparent)]
    Ledger(#[from] wisp_ledger::LedgerError),

    /// Underlying database failure.
    #[error(transparent)]
    Db(#[from] wisp_db::DbError),
}

pub type Result<T> = std::result::Result<T, DistributionError>;
