//! Shared type aliases and small wrappers used across the workspace.

use std::{fmt, str::FromStr};

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Block height on the UTXO chain.
pub type BitcoinBlockHeight = u64;

/// An opaque reference to a transaction submitted on the contract chain.
///
/// Recorded when a registration or user call is submitted and re-polled
/// after a restart. The agent never re-submits based on a recorded
/// reference, it only observes its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxRef(pub B256);

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a transaction reference cannot be parsed from hex.
#[derive(Debug, Clone, Error)]
#[error("invalid transaction reference: {0}")]
pub struct ParseTxRefError(String);

impl FromStr for TxRef {
    type Err = ParseTxRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<B256>()
            .map(TxRef)
            .map_err(|e| ParseTxRefError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_ref_hex_round_trip() {
        let tx_ref = TxRef(B256::repeat_byte(0xab));
        let rendered = tx_ref.to_string();
        assert_eq!(rendered.parse::<TxRef>().unwrap(), tx_ref);
    }

    #[test]
    fn tx_ref_rejects_garbage() {
        assert!("not-a-hash".parse::<TxRef>().is_err());
    }
}
