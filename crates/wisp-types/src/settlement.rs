//! Settlement batches and distribution reports.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// Lifecycle of one settlement batch.
///
/// Any failure before `Confirmed` must leave every included account's
/// `today_points` untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    /// Payouts computed from the snapshot; nothing sent yet.
    Computed,
    /// Distribution pool funded from the treasury.
    Funded,
    /// Batch payment submitted to the gateway.
    Submitted,
    /// Gateway confirmed the batch; counters may be reset.
    Confirmed,
    /// Cycle aborted; no counters were reset.
    Failed,
}

impl BatchStatus {
    /// Stable lowercase name, used for the settlements log.
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Computed => "computed",
            BatchStatus::Funded => "funded",
            BatchStatus::Submitted => "submitted",
            BatchStatus::Confirmed => "confirmed",
            BatchStatus::Failed => "failed",
        }
    }
}

/// One recipient's line in a settlement batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutEntry {
    pub user_id: UserId,
    pub payout_address: String,
    /// Points snapshotted for this cycle.
    pub points: u64,
    /// Contributor payout in micro-wisps (after the user-share split).
    pub amount: u64,
}

/// The ephemeral result of computing one distribution cycle.
///
/// Entry order is the snapshot order (points descending, then user id), which
/// keeps batch payments deterministic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementBatch {
    /// Deterministic id: hex BLAKE3 over the canonical snapshot. Doubles as
    /// the batch-pay memo and the retry idempotency anchor.
    pub batch_id: String,
    pub entries: Vec<PayoutEntry>,
    pub total_points: u64,
    /// Full converted value of the snapshot, in micro-wisps.
    pub total_amount: u64,
    /// Sum of contributor payouts.
    pub user_share: u64,
    /// Remainder routed to the charity pool.
    pub charity_share: u64,
    pub status: BatchStatus,
    pub tx_id: Option<String>,
}

impl SettlementBatch {
    /// A zero-amount batch for a cycle with no eligible users.
    pub fn empty() -> Self {
        Self {
            batch_id: String::new(),
            entries: Vec::new(),
            total_points: 0,
            total_amount: 0,
            user_share: 0,
            charity_share: 0,
            status: BatchStatus::Confirmed,
            tx_id: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
