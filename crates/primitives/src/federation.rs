//! Federation parameters frozen at startup.

use secp256k1::PublicKey;
use serde::Serialize;
use thiserror::Error;

use crate::bitcoin::BtcAddress;

/// Errors rejected by the [`FederationInfo`] constructor.
///
/// These make a partially-assembled or self-contradictory snapshot
/// unrepresentable: every `FederationInfo` that exists is complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidFederationInfo {
    /// The federation reported a size of zero.
    #[error("federation size must be greater than zero")]
    EmptyFederation,

    /// The signing threshold exceeds the member count.
    #[error("federation threshold {threshold} exceeds size {size}")]
    ThresholdExceedsSize {
        /// Reported signing threshold.
        threshold: u32,
        /// Reported member count.
        size: u32,
    },

    /// The number of fetched public keys does not match the reported size.
    #[error("expected {expected} federation keys, got {actual}")]
    KeyCountMismatch {
        /// Reported member count.
        expected: u32,
        /// Number of keys actually collected.
        actual: usize,
    },
}

/// Process-lifetime snapshot of the federation's public parameters.
///
/// Assembled once at startup and immutable afterwards; federation
/// membership changes require a restart. Consumers hold this by shared
/// reference for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FederationInfo {
    size: u32,
    threshold: u32,
    public_keys: Vec<PublicKey>,
    address: BtcAddress,
    activation_height: u64,
    iris_activation_height: u64,
    erp_keys: Vec<PublicKey>,
}

impl FederationInfo {
    /// Validates and freezes an assembled snapshot.
    pub fn new(
        size: u32,
        threshold: u32,
        public_keys: Vec<PublicKey>,
        address: BtcAddress,
        activation_height: u64,
        iris_activation_height: u64,
        erp_keys: Vec<PublicKey>,
    ) -> Result<Self, InvalidFederationInfo> {
        if size == 0 {
            return Err(InvalidFederationInfo::EmptyFederation);
        }
        if threshold > size {
            return Err(InvalidFederationInfo::ThresholdExceedsSize { threshold, size });
        }
        if public_keys.len() != size as usize {
            return Err(InvalidFederationInfo::KeyCountMismatch {
                expected: size,
                actual: public_keys.len(),
            });
        }

        Ok(Self {
            size,
            threshold,
            public_keys,
            address,
            activation_height,
            iris_activation_height,
            erp_keys,
        })
    }

    /// Number of federation members.
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Signatures required to move federation funds.
    pub const fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Ordered member public keys; length equals [`size`](Self::size).
    pub fn public_keys(&self) -> &[PublicKey] {
        &self.public_keys
    }

    /// Derived UTXO-chain deposit address of the federation.
    pub const fn address(&self) -> &BtcAddress {
        &self.address
    }

    /// Block height at which the active federation was created.
    pub const fn activation_height(&self) -> u64 {
        self.activation_height
    }

    /// Configured activation height for post-Iris address derivation.
    pub const fn iris_activation_height(&self) -> u64 {
        self.iris_activation_height
    }

    /// Configured emergency-recovery-protocol keys.
    pub fn erp_keys(&self) -> &[PublicKey] {
        &self.erp_keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fed_address, fed_keys};

    #[test]
    fn accepts_consistent_snapshot() {
        let keys = fed_keys(3);
        let info =
            FederationInfo::new(3, 2, keys.clone(), fed_address(), 100, 500, vec![]).unwrap();
        assert_eq!(info.size(), 3);
        assert_eq!(info.threshold(), 2);
        assert_eq!(info.public_keys(), &keys[..]);
    }

    #[test]
    fn rejects_empty_federation() {
        let err = FederationInfo::new(0, 0, vec![], fed_address(), 0, 0, vec![]).unwrap_err();
        assert_eq!(err, InvalidFederationInfo::EmptyFederation);
    }

    #[test]
    fn rejects_threshold_above_size() {
        let err =
            FederationInfo::new(2, 3, fed_keys(2), fed_address(), 0, 0, vec![]).unwrap_err();
        assert!(matches!(
            err,
            InvalidFederationInfo::ThresholdExceedsSize { threshold: 3, size: 2 }
        ));
    }

    #[test]
    fn rejects_key_count_mismatch() {
        let err =
            FederationInfo::new(3, 2, fed_keys(2), fed_address(), 0, 0, vec![]).unwrap_err();
        assert!(matches!(
            err,
            InvalidFederationInfo::KeyCountMismatch { expected: 3, actual: 2 }
        ));
    }
}
