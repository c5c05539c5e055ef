//! Collaborator contracts for both chains: the contract-chain client trait
//! and its JSON-RPC implementation, the provider signer, the
//! transient/fatal error split and the bounded retry helper.
//!
//! The UTXO-chain connector has no trait here: confirmed deposit proofs
//! enter the agent through the serving layer's callback surface and are
//! treated as opaque, pre-verified material.

pub mod constants;
pub mod contract;
pub mod error;
pub mod mock;
pub mod retry;
pub mod rpc;

pub use contract::{ContractChainClient, ProviderSigner, TxStatus};
pub use error::{ChainError, ChainResult};
pub use retry::{with_retry, RetryConfig};
