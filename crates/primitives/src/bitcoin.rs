//! Bitcoin primitives.

use bitcoin::{address::NetworkUnchecked, Address, Network};
use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// A wrapper around [`bitcoin::Address`] that couples the address with the
/// network it is valid on and preserves that pairing across
/// serialization/deserialization.
///
/// The canonical string rendering of the wrapped address is what enters the
/// quote hash and the persisted quote record, so the wrapper also pins down
/// a single textual form for every address.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct BtcAddress {
    /// The [`bitcoin::Network`] that this address is valid in.
    network: Network,

    /// The actual [`Address`] that this type wraps.
    address: Address,
}

/// Error produced when parsing a [`BtcAddress`] from its textual form.
#[derive(Debug, Error)]
pub enum ParseBtcAddressError {
    /// The string is not a bitcoin address at all.
    #[error("malformed bitcoin address: {0}")]
    Malformed(#[from] bitcoin::address::ParseError),
}

impl BtcAddress {
    /// Parses a bitcoin address from a string, requiring it to be valid on
    /// the given network.
    pub fn parse(address_str: &str, network: Network) -> Result<Self, ParseBtcAddressError> {
        let address = address_str.parse::<Address<NetworkUnchecked>>()?;
        let address = address.require_network(network)?;

        Ok(Self { network, address })
    }

    /// Returns the wrapped address.
    pub const fn address(&self) -> &Address {
        &self.address
    }

    /// Returns the network the address is valid on.
    pub const fn network(&self) -> &Network {
        &self.network
    }

    /// The single textual form of this address used for hashing and
    /// persistence.
    pub fn canonical(&self) -> String {
        self.address.to_string()
    }
}

impl<'de> Deserialize<'de> for BtcAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct BtcAddressShim {
            network: Network,
            address: String,
        }

        let shim = BtcAddressShim::deserialize(deserializer)?;
        let address = shim
            .address
            .parse::<Address<NetworkUnchecked>>()
            .map_err(|_| de::Error::custom("invalid bitcoin address"))?
            .require_network(shim.network)
            .map_err(|_| de::Error::custom("address invalid for given network"))?;

        Ok(BtcAddress {
            network: shim.network,
            address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAINNET_P2PKH: &str = "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2";

    #[test]
    fn parse_accepts_address_on_declared_network() {
        let addr = BtcAddress::parse(MAINNET_P2PKH, Network::Bitcoin).unwrap();
        assert_eq!(addr.canonical(), MAINNET_P2PKH);
        assert_eq!(*addr.network(), Network::Bitcoin);
    }

    #[test]
    fn parse_rejects_wrong_network() {
        assert!(BtcAddress::parse(MAINNET_P2PKH, Network::Regtest).is_err());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(BtcAddress::parse("clearly-not-an-address", Network::Bitcoin).is_err());
    }
}
