//! # wisp-gateway
//!
//! The settlement gateway seam: every on-chain operation the pipeline needs,
//! behind one async trait. The real blockchain client lives outside this
//! workspace; [`stub::StubGateway`] stands in for it in development and tests.
//!
//! ## Modules
//!
//! - [`stub`] — In-memory gateway with deterministic tx ids and failure knobs

pub mod stub;

use async_trait::async_trait;

/// Error types for gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The gateway rejected or failed the operation.
    #[error("gateway operation failed: {0}")]
    OperationFailed(String),

    /// The gateway did not respond within the caller's deadline.
    #[error("gateway timed out after {seconds}s")]
    Timeout {
        /// The deadline that elapsed.
        seconds: u64,
    },
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// A transaction identifier returned by the settlement layer.
pub type TxId = String;

/// Asynchronous settlement operations consumed by the pipeline.
///
/// Implementations may be remote and slow; callers bound every invocation
/// with a timeout. Anchoring must tolerate duplicate proof hashes (the hash
/// is idempotent downstream).
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    /// Current treasury balance in micro-wisps.
    async fn get_treasury_balance(&self) -> Result<u64>;

    /// Move `amount` micro-wisps from the treasury into the distribution pool.
    async fn fund_distribution_pool(&self, amount: u64) -> Result<TxId>;

    /// Execute one batch payment of `(payout_address, amount)` pairs.
    ///
    /// The memo ties the batch to its snapshot for idempotent retry.
    async fn batch_pay(&self, payouts: &[(String, u64)], memo: &str) -> Result<TxId>;

    /// Anchor a usage proof on the settlement layer.
    async fn anchor_proof(&self, proof_hash: &str, metadata: &str) -> Result<TxId>;
}
