//! The contract-chain collaborator traits consumed by the core.

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use bridge_lp_primitives::{DepositProof, ParsedQuote, QuoteHash, TxRef};
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};

use crate::error::ChainResult;

/// Observed status of a submitted contract-chain transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Not yet included, or included but below the required depth.
    Pending,

    /// Included with a success receipt at the required depth.
    Confirmed,

    /// Included with a failure receipt; terminal.
    Reverted,
}

/// Client of the smart-contract chain hosting the liquidity bridge
/// contract and the federation bridge.
///
/// All methods are read-or-submit RPC interactions; every failure is
/// reported through the transient/fatal split of
/// [`ChainError`](crate::error::ChainError). Implementations must be safe
/// to share across tasks.
#[async_trait]
pub trait ContractChainClient: Send + Sync {
    /// Liquidity currently available to the provider, in wei.
    async fn available_liquidity(&self, provider: Address) -> ChainResult<U256>;

    /// Collateral currently locked by the provider, in wei.
    async fn collateral(&self, provider: Address) -> ChainResult<U256>;

    /// Number of federation members.
    async fn fed_size(&self) -> ChainResult<u32>;

    /// Signatures required to move federation funds.
    async fn fed_threshold(&self) -> ChainResult<u32>;

    /// Public key of the federation member at `index`.
    async fn fed_public_key(&self, index: u32) -> ChainResult<PublicKey>;

    /// Textual form of the derived federation deposit address.
    async fn fed_address(&self) -> ChainResult<String>;

    /// Block height at which the active federation was created.
    async fn active_fed_block_height(&self) -> ChainResult<u64>;

    /// Estimates gas for a call; a fatal error means the call would
    /// revert and must not be submitted.
    async fn estimate_gas(&self, to: Address, value: U256, data: Bytes) -> ChainResult<u64>;

    /// Current gas price, in wei.
    async fn gas_price(&self) -> ChainResult<U256>;

    /// Submits the combined register-and-call transaction.
    async fn register_peg_in(
        &self,
        quote: &ParsedQuote,
        signature: &Bytes,
        proof: &DepositProof,
    ) -> ChainResult<TxRef>;

    /// Submits a registration that does not perform the user call.
    async fn register_peg_in_without_tx(
        &self,
        quote: &ParsedQuote,
        signature: &Bytes,
        proof: &DepositProof,
    ) -> ChainResult<TxRef>;

    /// Submits the stand-alone user call after a plain registration.
    async fn call_for_user(&self, quote: &ParsedQuote) -> ChainResult<TxRef>;

    /// Observes the status of a previously submitted transaction.
    async fn tx_status(&self, tx_ref: TxRef) -> ChainResult<TxStatus>;
}

/// Produces the provider's signature over a quote hash, as expected by the
/// bridge contract's registration entry points.
///
/// Key custody is the implementation's concern; the core only ever sees
/// signature bytes.
#[async_trait]
pub trait ProviderSigner: Send + Sync {
    /// Signs the given quote hash.
    async fn sign_quote(&self, hash: QuoteHash) -> ChainResult<Bytes>;
}
