//! Per-user point accounts.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// Snapshot of one user's point counters.
///
/// `epoch_points` is monotonic non-decreasing within an epoch. `today_points`
/// is the only counter touched by settlement, and only by conditional
/// subtraction after a confirmed payout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointsSnapshot {
    pub user_id: UserId,
    pub epoch_points: u64,
    pub today_points: u64,
    /// Unix seconds of the last credit or reset, 0 for untouched accounts.
    pub last_updated_at: u64,
}

impl PointsSnapshot {
    /// A zero-valued snapshot for a user with no account yet.
    pub fn zero(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            epoch_points: 0,
            today_points: 0,
            last_updated_at: 0,
        }
    }
}

/// A user eligible for the current settlement cycle: positive `today_points`
/// and a registered payout address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibleUser {
    pub user_id: UserId,
    pub payout_address: String,
    pub today_points: u64,
}
