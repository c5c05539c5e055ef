//! Deposit proof material handed over by the UTXO-chain connector.

use bitcoin::{consensus, Transaction, Txid};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::BitcoinBlockHeight;

/// Errors produced while constructing or decoding a [`DepositProof`].
#[derive(Debug, Error)]
pub enum DepositProofError {
    /// The raw transaction bytes were empty.
    #[error("deposit transaction bytes must not be empty")]
    EmptyTransaction,

    /// The inclusion proof bytes were empty.
    #[error("inclusion proof must not be empty")]
    EmptyProof,

    /// The raw transaction bytes do not consensus-decode.
    #[error("deposit transaction does not decode: {0}")]
    MalformedTransaction(#[from] consensus::encode::Error),
}

/// A confirmed deposit on the UTXO chain: the raw transaction, its
/// merkle inclusion proof and the height of the block containing it.
///
/// The connector guarantees the deposit has reached the quote's required
/// confirmation depth before producing one of these; the agent treats the
/// proof as opaque bytes and forwards it to the bridge contract, which
/// performs the actual verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositProof {
    raw_tx: Vec<u8>,
    merkle_proof: Vec<u8>,
    block_height: BitcoinBlockHeight,
}

impl DepositProof {
    /// Wraps proof material, rejecting trivially-empty inputs.
    pub fn new(
        raw_tx: Vec<u8>,
        merkle_proof: Vec<u8>,
        block_height: BitcoinBlockHeight,
    ) -> Result<Self, DepositProofError> {
        if raw_tx.is_empty() {
            return Err(DepositProofError::EmptyTransaction);
        }
        if merkle_proof.is_empty() {
            return Err(DepositProofError::EmptyProof);
        }

        Ok(Self {
            raw_tx,
            merkle_proof,
            block_height,
        })
    }

    /// Consensus-encoded deposit transaction.
    pub fn raw_tx(&self) -> &[u8] {
        &self.raw_tx
    }

    /// Serialized merkle inclusion proof.
    pub fn merkle_proof(&self) -> &[u8] {
        &self.merkle_proof
    }

    /// Height of the block containing the deposit.
    pub const fn block_height(&self) -> BitcoinBlockHeight {
        self.block_height
    }

    /// Decodes the deposit transaction.
    pub fn transaction(&self) -> Result<Transaction, DepositProofError> {
        Ok(consensus::deserialize(&self.raw_tx)?)
    }

    /// Txid of the deposit transaction.
    pub fn txid(&self) -> Result<Txid, DepositProofError> {
        Ok(self.transaction()?.compute_txid())
    }
}
