//! Bytes-to-points conversion policy.
//!
//! One point per whole MiB served. The division floors: fractional MiB
//! contributes zero points, a deliberate policy to avoid over-crediting.

use wisp_types::BYTES_PER_POINT;

/// Points earned for a given byte count. Floors to whole MiB.
pub fn points_for_bytes(bytes_served: u64) -> u64 {
    bytes_served / BYTES_PER_POINT
}
