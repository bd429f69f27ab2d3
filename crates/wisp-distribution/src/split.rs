//! Payout split validation and batch computation.
//!
//! Settlement value is split two ways:
//!
//! - **Contributors**: default 70%, paid per user in the batch
//! - **Charity pool**: default 30%, the remainder after contributor payouts
//!
//! The percentages must sum to 100. The charity share is computed as the
//! remainder of the total, so integer rounding never loses value.

use serde::{Deserialize, Serialize};
use wisp_proof::hash;
use wisp_types::points::EligibleUser;
use wisp_types::settlement::{BatchStatus, PayoutEntry, SettlementBatch};

use crate::{DistributionError, Result};

/// Default contributor share percentage.
pub const DEFAULT_USER_PCT: u8 = 70;

/// Default charity pool share percentage.
pub const DEFAULT_CHARITY_PCT: u8 = 30;

/// Payout split configuration for a settlement cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutSplitConfig {
    /// Contributor share percentage.
    pub user_pct: u8,
    /// Charity pool share percentage.
    pub charity_pct: u8,
}

/// Default payout split: users=70, charity=30.
pub const DEFAULT_SPLIT: PayoutSplitConfig = PayoutSplitConfig {
    user_pct: DEFAULT_USER_PCT,
    charity_pct: DEFAULT_CHARITY_PCT,
};

/// Validate a payout split configuration.
///
/// # Errors
///
/// - [`DistributionError::InvalidSplitTotal`] if percentages do not sum to 100
pub fn validate_split(config: &PayoutSplitConfig) -> Result<()> {
    let total = config.user_pct as u16 + config.charity_pct as u16;
    if total != 100 {
        return Err(DistributionError::InvalidSplitTotal { total });
    }
    Ok(())
}

/// Deterministic batch id over the snapshot: hex BLAKE3 of every entry's
/// `(user_id, payout_address, points)` in snapshot order.
///
/// Identical snapshots always produce the identical id, which is what lets a
/// retried cycle recognize an already-paid batch.
pub fn batch_id(eligible: &[EligibleUser]) -> String {
    let mut buf = Vec::new();
    for user in eligible {
        buf.extend_from_slice(user.user_id.as_bytes());
        buf.push(hash::FIELD_SEPARATOR);
        buf.extend_from_slice(user.payout_address.as_bytes());
        buf.push(hash::FIELD_SEPARATOR);
        buf.extend_from_slice(&user.today_points.to_be_bytes());
    }
    hex::encode(hash::derive(hash::contexts::SETTLEMENT_BATCH, &buf))
}

/// Compute one settlement batch from a snapshot.
///
/// Entry order is the snapshot order. Per-user amounts are
/// `points × rate × user_pct / 100` with checked arithmetic; the charity
/// share is the remainder of the converted total.
///
/// # Errors
///
/// - [`DistributionError::InvalidSplitTotal`] if the split is invalid
/// - [`DistributionError::Overflow`] on arithmetic overflow
pub fn compute_batch(
    eligible: &[EligibleUser],
    rate_micro_wisps_per_point: u64,
    split: &PayoutSplitConfig,
) -> Result<SettlementBatch> {
    validate_split(split)?;

    if eligible.is_empty() {
        return Ok(SettlementBatch::empty());
    }

    let mut total_points: u64 = 0;
    let mut user_share: u64 = 0;
    let mut entries = Vec::with_capacity(eligible.len());

    for user in eligible {
        total_points = total_points
            .checked_add(user.today_points)
            .ok_or(DistributionError::Overflow)?;

        let value = user
            .today_points
            .checked_mul(rate_micro_wisps_per_point)
            .ok_or(DistributionError::Overflow)?;
        let amount = value
            .checked_mul(split.user_pct as u64)
            .ok_or(DistributionError::Overflow)?
            / 100;

        user_share = user_share
            .checked_add(amount)
            .ok_or(DistributionError::Overflow)?;

        entries.push(PayoutEntry {
            user_id: user.user_id.clone(),
            payout_address: user.payout_address.clone(),
            points: user.today_points,
            amount,
        });
    }

    let total_amount = total_points
        .checked_mul(rate_micro_wisps_per_point)
        .ok_or(DistributionError::Overflow)?;
    // Charity takes the remainder, so rounding never loses value.
    let charity_share = total_amount - user_share;

    Ok(SettlementBatch {
        batch_id: batch_id(eligible),
        entries,
        total_points,
        total_amount,
        user_share,
        charity_share,
        status: BatchStatus::Computed,
        tx_id: None,
    })
}
