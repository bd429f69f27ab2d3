//! In-memory settlement gateway for development and testing.
//!
//! Keeps a treasury balance and call counters behind a mutex, hands out
//! deterministic sequential tx ids, and exposes failure-injection knobs so
//! tests can exercise retry and abort paths without a chain.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::{GatewayError, Result, SettlementGateway, TxId};

/// Default stub treasury balance: 1,000 WISP in micro-wisps.
pub const DEFAULT_TREASURY: u64 = 1_000_000_000;

#[derive(Debug, Default)]
struct StubState {
    treasury: u64,
    pool: u64,
    next_tx: u64,
    fail_next_anchor: u32,
    fail_next_fund: u32,
    fail_next_batch: u32,
    anchor_calls: u64,
    fund_calls: u64,
    batch_calls: u64,
    balance_calls: u64,
    batches: Vec<(Vec<(String, u64)>, String)>,
    call_delay: Option<Duration>,
}

/// A stub gateway backed by in-memory state.
#[derive(Debug)]
pub struct StubGateway {
    state: Mutex<StubState>,
}

impl StubGateway {
    /// Create a stub with the default treasury balance.
    pub fn new() -> Self {
        Self::with_treasury(DEFAULT_TREASURY)
    }

    /// Create a stub with a specific treasury balance in micro-wisps.
    pub fn with_treasury(treasury: u64) -> Self {
        Self {
            state: Mutex::new(StubState {
                treasury,
                ..StubState::default()
            }),
        }
    }

    /// Delay every call by `delay`, to simulate a slow or hung gateway.
    pub fn set_call_delay(&self, delay: Duration) {
        self.lock().call_delay = Some(delay);
    }

    async fn simulate_latency(&self) {
        let delay = self.lock().call_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Make the next `n` anchor calls fail.
    pub fn fail_next_anchor(&self, n: u32) {
        self.lock().fail_next_anchor = n;
    }

    /// Make the next `n` funding calls fail.
    pub fn fail_next_fund(&self, n: u32) {
        self.lock().fail_next_fund = n;
    }

    /// Make the next `n` batch payments fail.
    pub fn fail_next_batch(&self, n: u32) {
        self.lock().fail_next_batch = n;
    }

    /// Number of anchor calls received.
    pub fn anchor_calls(&self) -> u64 {
        self.lock().anchor_calls
    }

    /// Number of funding calls received.
    pub fn fund_calls(&self) -> u64 {
        self.lock().fund_calls
    }

    /// Number of batch payments received.
    pub fn batch_calls(&self) -> u64 {
        self.lock().batch_calls
    }

    /// Remaining distribution pool balance.
    pub fn pool_balance(&self) -> u64 {
        self.lock().pool
    }

    /// Batches executed so far, as `(payouts, memo)`.
    pub fn executed_batches(&self) -> Vec<(Vec<(String, u64)>, String)> {
        self.lock().batches.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        // The mutex guards plain counters; poisoning cannot leave them torn.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn mint_tx(state: &mut StubState, kind: &str) -> TxId {
        state.next_tx += 1;
        format!("stub-{kind}-{:06}", state.next_tx)
    }
}

impl Default for StubGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettlementGateway for StubGateway {
    async fn get_treasury_balance(&self) -> Result<u64> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.balance_calls += 1;
        Ok(state.treasury)
    }

    async fn fund_distribution_pool(&self, amount: u64) -> Result<TxId> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.fund_calls += 1;

        if state.fail_next_fund > 0 {
            state.fail_next_fund -= 1;
            return Err(GatewayError::OperationFailed("injected fund failure".into()));
        }
        if state.treasury < amount {
            return Err(GatewayError::OperationFailed(format!(
                "insufficient treasury: have {}, need {amount}",
                state.treasury
            )));
        }

        state.treasury -= amount;
        state.pool += amount;
        let tx = Self::mint_tx(&mut state, "fund");
        tracing::debug!(amount, tx, "stub gateway: pool funded");
        Ok(tx)
    }

    async fn batch_pay(&self, payouts: &[(String, u64)], memo: &str) -> Result<TxId> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.batch_calls += 1;

        if state.fail_next_batch > 0 {
            state.fail_next_batch -= 1;
            return Err(GatewayError::OperationFailed("injected batch failure".into()));
        }

        let total: u64 = payouts.iter().map(|(_, amount)| amount).sum();
        if state.pool < total {
            return Err(GatewayError::OperationFailed(format!(
                "insufficient pool: have {}, need {total}",
                state.pool
            )));
        }

        state.pool -= total;
        state.batches.push((payouts.to_vec(), memo.to_string()));
        let tx = Self::mint_tx(&mut state, "batch");
        tracing::debug!(recipients = payouts.len(), total, tx, "stub gateway: batch paid");
        Ok(tx)
    }

    async fn anchor_proof(&self, proof_hash: &str, _metadata: &str) -> Result<TxId> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.anchor_calls += 1;

        if state.fail_next_anchor > 0 {
            state.fail_next_anchor -= 1;
            return Err(GatewayError::OperationFailed("injected anchor failure".into()));
        }

        let tx = Self::mint_tx(&mut state, "anchor");
        tracing::trace!(proof_hash, tx, "stub gateway: proof anchored");
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fund_moves_treasury_to_pool() {
        let gw = StubGateway::with_treasury(1_000);
        gw.fund_distribution_pool(400).await.expect("fund");
        assert_eq!(gw.get_treasury_balance().await.expect("balance"), 600);
        assert_eq!(gw.pool_balance(), 400);
    }

    #[tokio::test]
    async fn test_fund_insufficient() {
        let gw = StubGateway::with_treasury(100);
        assert!(gw.fund_distribution_pool(400).await.is_err());
        assert_eq!(gw.get_treasury_balance().await.expect("balance"), 100);
    }

    #[tokio::test]
    async fn test_batch_pay_drains_pool() {
        let gw = StubGateway::with_treasury(1_000);
        gw.fund_distribution_pool(500).await.expect("fund");

        let payouts = vec![("addr1".to_string(), 300), ("addr2".to_string(), 200)];
        let tx = gw.batch_pay(&payouts, "memo-1").await.expect("pay");
        assert!(tx.starts_with("stub-batch-"));
        assert_eq!(gw.pool_balance(), 0);

        let batches = gw.executed_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].1, "memo-1");
    }

    #[tokio::test]
    async fn test_anchor_failure_injection() {
        let gw = StubGateway::new();
        gw.fail_next_anchor(1);

        assert!(gw.anchor_proof("hash", "").await.is_err());
        assert!(gw.anchor_proof("hash", "").await.is_ok());
        assert_eq!(gw.anchor_calls(), 2);
    }

    #[tokio::test]
    async fn test_tx_ids_deterministic() {
        let gw = StubGateway::new();
        let a = gw.anchor_proof("h1", "").await.expect("anchor");
        let b = gw.anchor_proof("h2", "").await.expect("anchor");
        assert_eq!(a, "stub-anchor-000001");
        assert_eq!(b, "stub-anchor-000002");
    }
}
