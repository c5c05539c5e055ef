//! Configurable in-process doubles for the chain collaborators.
//!
//! Used by tests across the workspace: every failure mode the executor
//! must handle (stale liquidity, failing federation reads, fatal gas
//! estimation, reverted receipts, flaky transport) can be injected here,
//! and every submission is counted so at-most-once properties are
//! checkable.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use bridge_lp_primitives::{
    test_utils::{fed_address, fed_keys},
    DepositProof, ParsedQuote, QuoteHash, TxRef,
};
use secp256k1::PublicKey;

use crate::{
    contract::{ContractChainClient, ProviderSigner, TxStatus},
    error::{ChainError, ChainResult},
};

#[derive(Debug)]
struct MockState {
    liquidity: U256,
    collateral: U256,
    fed_size: u32,
    fed_threshold: u32,
    fed_pub_keys: Vec<PublicKey>,
    fed_addr: String,
    active_fed_height: u64,
    fed_key_failure: Option<(u32, ChainError)>,
    transient_liquidity_failures: usize,
    gas_failure: Option<ChainError>,
    status_script: VecDeque<TxStatus>,
}

/// A scriptable [`ContractChainClient`] double.
#[derive(Debug)]
pub struct MockContractChain {
    state: Mutex<MockState>,
    register_calls: AtomicUsize,
    register_without_tx_calls: AtomicUsize,
    call_for_user_calls: AtomicUsize,
    next_tx: AtomicUsize,
}

impl Default for MockContractChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockContractChain {
    /// A healthy chain: 2000 wei of liquidity, ample collateral, a
    /// three-member federation and receipts that confirm immediately.
    pub fn new() -> Self {
        let keys = fed_keys(3);
        Self {
            state: Mutex::new(MockState {
                liquidity: U256::from(2000),
                collateral: U256::from(1_000_000),
                fed_size: keys.len() as u32,
                fed_threshold: 2,
                fed_pub_keys: keys,
                fed_addr: fed_address().canonical(),
                active_fed_height: 100,
                fed_key_failure: None,
                transient_liquidity_failures: 0,
                gas_failure: None,
                status_script: VecDeque::new(),
            }),
            register_calls: AtomicUsize::new(0),
            register_without_tx_calls: AtomicUsize::new(0),
            call_for_user_calls: AtomicUsize::new(0),
            next_tx: AtomicUsize::new(1),
        }
    }

    /// Sets the liquidity reported to the guard.
    pub fn set_liquidity(&self, liquidity: U256) {
        self.state.lock().unwrap().liquidity = liquidity;
    }

    /// Sets the collateral reported to the guard.
    pub fn set_collateral(&self, collateral: U256) {
        self.state.lock().unwrap().collateral = collateral;
    }

    /// Makes the federation key read at `index` fail with `err`.
    pub fn fail_fed_key_at(&self, index: u32, err: ChainError) {
        self.state.lock().unwrap().fed_key_failure = Some((index, err));
    }

    /// Overrides the textual federation address.
    pub fn set_fed_address(&self, address: String) {
        self.state.lock().unwrap().fed_addr = address;
    }

    /// Overrides the reported signing threshold.
    pub fn set_fed_threshold(&self, threshold: u32) {
        self.state.lock().unwrap().fed_threshold = threshold;
    }

    /// Makes every gas estimation fail with `err` until cleared.
    pub fn fail_gas_estimation(&self, err: ChainError) {
        self.state.lock().unwrap().gas_failure = Some(err);
    }

    /// Makes the next `n` liquidity reads fail transiently.
    pub fn fail_next_liquidity_reads(&self, n: usize) {
        self.state.lock().unwrap().transient_liquidity_failures = n;
    }

    /// Scripts the statuses returned by successive `tx_status` calls; once
    /// the script runs dry, `Confirmed` is returned.
    pub fn script_statuses(&self, statuses: impl IntoIterator<Item = TxStatus>) {
        self.state.lock().unwrap().status_script = statuses.into_iter().collect();
    }

    /// Number of combined register-and-call submissions.
    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    /// Number of plain registration submissions.
    pub fn register_without_tx_calls(&self) -> usize {
        self.register_without_tx_calls.load(Ordering::SeqCst)
    }

    /// Number of stand-alone user call submissions.
    pub fn call_for_user_calls(&self) -> usize {
        self.call_for_user_calls.load(Ordering::SeqCst)
    }

    /// Total number of registration submissions of either kind.
    pub fn total_registrations(&self) -> usize {
        self.register_calls() + self.register_without_tx_calls()
    }

    fn mint_tx_ref(&self) -> TxRef {
        let n = self.next_tx.fetch_add(1, Ordering::SeqCst) as u64;
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&n.to_be_bytes());
        TxRef(B256::from(bytes))
    }
}

#[async_trait]
impl ContractChainClient for MockContractChain {
    async fn available_liquidity(&self, _provider: Address) -> ChainResult<U256> {
        let mut state = self.state.lock().unwrap();
        if state.transient_liquidity_failures > 0 {
            state.transient_liquidity_failures -= 1;
            return Err(ChainError::Transient("liquidity read timed out".into()));
        }
        Ok(state.liquidity)
    }

    async fn collateral(&self, _provider: Address) -> ChainResult<U256> {
        Ok(self.state.lock().unwrap().collateral)
    }

    async fn fed_size(&self) -> ChainResult<u32> {
        Ok(self.state.lock().unwrap().fed_size)
    }

    async fn fed_threshold(&self) -> ChainResult<u32> {
        Ok(self.state.lock().unwrap().fed_threshold)
    }

    async fn fed_public_key(&self, index: u32) -> ChainResult<PublicKey> {
        let state = self.state.lock().unwrap();
        if let Some((failing, err)) = &state.fed_key_failure {
            if *failing == index {
                return Err(err.clone());
            }
        }
        state
            .fed_pub_keys
            .get(index as usize)
            .copied()
            .ok_or_else(|| ChainError::Fatal(format!("no federation member at index {index}")))
    }

    async fn fed_address(&self) -> ChainResult<String> {
        Ok(self.state.lock().unwrap().fed_addr.clone())
    }

    async fn active_fed_block_height(&self) -> ChainResult<u64> {
        Ok(self.state.lock().unwrap().active_fed_height)
    }

    async fn estimate_gas(&self, _to: Address, _value: U256, data: Bytes) -> ChainResult<u64> {
        if let Some(err) = &self.state.lock().unwrap().gas_failure {
            return Err(err.clone());
        }
        Ok(21_000 + data.len() as u64 * 16)
    }

    async fn gas_price(&self) -> ChainResult<U256> {
        Ok(U256::from(1_000_000_000u64))
    }

    async fn register_peg_in(
        &self,
        _quote: &ParsedQuote,
        _signature: &Bytes,
        _proof: &DepositProof,
    ) -> ChainResult<TxRef> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.mint_tx_ref())
    }

    async fn register_peg_in_without_tx(
        &self,
        _quote: &ParsedQuote,
        _signature: &Bytes,
        _proof: &DepositProof,
    ) -> ChainResult<TxRef> {
        self.register_without_tx_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.mint_tx_ref())
    }

    async fn call_for_user(&self, _quote: &ParsedQuote) -> ChainResult<TxRef> {
        self.call_for_user_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.mint_tx_ref())
    }

    async fn tx_status(&self, _tx_ref: TxRef) -> ChainResult<TxStatus> {
        let mut state = self.state.lock().unwrap();
        Ok(state.status_script.pop_front().unwrap_or(TxStatus::Confirmed))
    }
}

/// A [`ProviderSigner`] double producing deterministic signature bytes.
#[derive(Debug, Default)]
pub struct MockSigner;

#[async_trait]
impl ProviderSigner for MockSigner {
    async fn sign_quote(&self, hash: QuoteHash) -> ChainResult<Bytes> {
        // 64-byte "signature" plus a recovery byte, derived from the hash.
        let mut sig = Vec::with_capacity(65);
        sig.extend_from_slice(hash.as_bytes());
        sig.extend_from_slice(hash.as_bytes());
        sig.push(0x1b);
        Ok(Bytes::from(sig))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_script_drains_then_confirms() {
        let chain = MockContractChain::new();
        chain.script_statuses([TxStatus::Pending, TxStatus::Pending]);

        let tx_ref = TxRef(B256::ZERO);
        assert_eq!(chain.tx_status(tx_ref).await.unwrap(), TxStatus::Pending);
        assert_eq!(chain.tx_status(tx_ref).await.unwrap(), TxStatus::Pending);
        assert_eq!(chain.tx_status(tx_ref).await.unwrap(), TxStatus::Confirmed);
    }

    #[tokio::test]
    async fn transient_liquidity_failures_heal() {
        let chain = MockContractChain::new();
        chain.fail_next_liquidity_reads(1);

        let provider = Address::repeat_byte(0x01);
        assert!(chain.available_liquidity(provider).await.is_err());
        assert!(chain.available_liquidity(provider).await.is_ok());
    }

    #[tokio::test]
    async fn tx_refs_are_unique() {
        let chain = MockContractChain::new();
        let quote = ParsedQuote::from(&bridge_lp_primitives::test_utils::sample_quote());
        let proof = bridge_lp_primitives::test_utils::sample_deposit_proof(10);
        let sig = Bytes::new();

        let a = chain.register_peg_in(&quote, &sig, &proof).await.unwrap();
        let b = chain.register_peg_in(&quote, &sig, &proof).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(chain.register_calls(), 2);
    }
}
