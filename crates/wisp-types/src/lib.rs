//! # wisp-types
//!
//! Shared domain types for the Wisp contribution network.
//!
//! Entities follow the proof-of-contribution data model: registered nodes
//! produce measurement samples, samples become hash-bound usage proofs, proofs
//! credit per-user point accounts, and a scheduled settlement converts points
//! into payouts.

pub mod node;
pub mod points;
pub mod proof;
pub mod sample;
pub mod settlement;

/// Stable opaque node identifier, unique per owning user.
pub type NodeId = String;

/// Stable user identifier.
pub type UserId = String;

/// 32-byte BLAKE3 digest.
pub type Hash = [u8; 32];

/// Micro-wisps per WISP (1 WISP = 1,000,000 micro-wisps).
pub const MICRO_WISPS_PER_WISP: u64 = 1_000_000;

/// Bytes served per point earned (1 MiB). Fractional MiB earns nothing.
pub const BYTES_PER_POINT: u64 = 1_048_576;

/// Default conversion rate: micro-wisps per point (0.001 WISP/point).
pub const DEFAULT_RATE_MICRO_WISPS_PER_POINT: u64 = 1_000;

/// Default contributor share of a settlement, in percent.
pub const DEFAULT_USER_SHARE_PCT: u8 = 70;

/// Default charity pool share of a settlement, in percent.
pub const DEFAULT_CHARITY_SHARE_PCT: u8 = 30;

/// Default measurement tick interval in seconds.
pub const DEFAULT_MEASUREMENT_INTERVAL_SECS: u64 = 300;

/// Default settlement cycle interval in seconds (24 hours).
pub const DEFAULT_DISTRIBUTION_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_constant_is_one_mib() {
        assert_eq!(BYTES_PER_POINT, 1024 * 1024);
    }

    #[test]
    fn test_default_split_sums_to_100() {
        assert_eq!(DEFAULT_USER_SHARE_PCT + DEFAULT_CHARITY_SHARE_PCT, 100);
    }
}
