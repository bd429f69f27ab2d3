//! Domain-separated BLAKE3 hashing for usage proofs.
//!
//! Cross-domain collisions are prevented by mandatory domain separation using
//! BLAKE3's derive_key mode with registered context strings. Using an
//! unregistered context string is a protocol violation.
//!
//! ## Canonical proof encoding
//!
//! The proof digest commits to exactly four fields, in this order:
//!
//! ```text
//! node_id ∥ 0x0A ∥ session_id ∥ 0x0A ∥ timestamp_be8 ∥ bytes_served_be8
//! ```
//!
//! Identifiers are UTF-8 and must not contain the `0x0A` separator; integers
//! are 8-byte big-endian. The layout is fixed — any change breaks proof
//! de-duplication against previously stored hashes.

use wisp_types::Hash;

/// Registered BLAKE3 context strings for the Wisp protocol.
pub mod contexts {
    /// Usage-proof digest binding a sample to its node and session.
    pub const USAGE_PROOF: &str = "Wisp v1 usage-proof";

    /// Settlement batch id binding a payout batch to its snapshot.
    pub const SETTLEMENT_BATCH: &str = "Wisp v1 settlement-batch";

    /// All registered context strings. Used for validation.
    pub const ALL_CONTEXTS: &[&str] = &[USAGE_PROOF, SETTLEMENT_BATCH];
}

/// Byte separating the variable-length identifier fields.
pub const FIELD_SEPARATOR: u8 = b'\n';

/// Build the canonical byte encoding a proof hash commits to.
pub fn canonical_proof_bytes(
    node_id: &str,
    session_id: &str,
    timestamp: u64,
    bytes_served: u64,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(node_id.len() + session_id.len() + 18);
    buf.extend_from_slice(node_id.as_bytes());
    buf.push(FIELD_SEPARATOR);
    buf.extend_from_slice(session_id.as_bytes());
    buf.push(FIELD_SEPARATOR);
    buf.extend_from_slice(&timestamp.to_be_bytes());
    buf.extend_from_slice(&bytes_served.to_be_bytes());
    buf
}

/// Compute the usage-proof digest for one sample.
///
/// Pure: identical inputs always yield the identical digest.
pub fn proof_hash(node_id: &str, session_id: &str, timestamp: u64, bytes_served: u64) -> Hash {
    let bytes = canonical_proof_bytes(node_id, session_id, timestamp, bytes_served);
    derive(contexts::USAGE_PROOF, &bytes)
}

/// Hex-encoded form of [`proof_hash`], as stored in the proof record.
pub fn proof_hash_hex(node_id: &str, session_id: &str, timestamp: u64, bytes_served: u64) -> String {
    hex::encode(proof_hash(node_id, session_id, timestamp, bytes_served))
}

/// Domain-separated digest using BLAKE3's key derivation mode.
pub fn derive(context: &str, data: &[u8]) -> Hash {
    ::blake3::derive_key(context, data)
}
