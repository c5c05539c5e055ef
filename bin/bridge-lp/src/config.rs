//! Node configuration, loaded from a TOML file.

use std::time::Duration;

use alloy_primitives::{Address, U256};
use bitcoin::Network;
use bridge_lp_chain::RetryConfig;
use serde::{Deserialize, Serialize};

/// The configuration values that dictate the behavior of the node.
///
/// None of these are consensus-critical; they bind the process to its
/// endpoints, its store and the provider's own risk limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Config {
    /// The RPC listen address for the serving layer.
    pub rpc_addr: String,

    /// Worker threads for the runtime.
    pub num_threads: Option<u8>,

    /// Pause between successive receipt polls.
    pub poll_interval: Option<Duration>,

    /// The sqlite quote store.
    pub db: DbConfig,

    /// The UTXO chain the federation lives on.
    pub btc: BtcConfig,

    /// The contract chain hosting the bridge contracts.
    pub chain: ChainConfig,

    /// The provider's own addresses and risk limits.
    pub provider: ProviderConfig,

    /// Retry budget for transient chain failures.
    pub retry: RetryConfig,

    /// Externally configured federation extension fields.
    pub federation: FederationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DbConfig {
    /// Path (or sqlite URL) of the quote database.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct BtcConfig {
    /// Network stored and fetched bitcoin addresses must be valid on.
    pub network: Network,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ChainConfig {
    /// JSON-RPC endpoint of the contract chain.
    pub endpoint: String,

    /// Address of the liquidity bridge contract.
    pub lbc_addr: Address,

    /// Address of the federation bridge.
    pub bridge_addr: Address,

    /// Execution confirmations required before a receipt counts.
    pub required_confirmations: u64,

    /// Hex-encoded private key of the submission wallet.
    pub wallet_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ProviderConfig {
    /// The provider's address on the contract chain.
    pub rsk_addr: Address,

    /// Minimum collateral the guard requires, in wei.
    pub min_collateral: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct FederationConfig {
    /// Activation height for post-Iris federation address derivation.
    pub iris_activation_height: u64,

    /// Hex-encoded emergency-recovery-protocol public keys.
    pub erp_keys: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serde_toml() {
        let config = r#"
            rpc_addr = "127.0.0.1:8555"
            num_threads = 4
            poll_interval = { secs = 5, nanos = 0 }

            [db]
            path = "lp.db"

            [btc]
            network = "bitcoin"

            [chain]
            endpoint = "http://localhost:4444"
            lbc_addr = "0x2222222222222222222222222222222222222222"
            bridge_addr = "0x0000000000000000000000000000000001000006"
            required_confirmations = 10
            wallet_key = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"

            [provider]
            rsk_addr = "0x3333333333333333333333333333333333333333"
            min_collateral = "1000000"

            [retry]
            max_retry_count = 3
            backoff_period = { secs = 1, nanos = 0 }

            [federation]
            iris_activation_height = 1500000
            erp_keys = [
                "0257c293086c4d4fe8943deda5f890a37d11bebd140e220faa76258a41d077b4d4",
            ]
        "#;

        let config = toml::from_str::<Config>(config);
        assert!(
            config.is_ok(),
            "must be able to deserialize config from toml but got: {}",
            config.unwrap_err()
        );

        let config = config.unwrap();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized = toml::from_str::<Config>(&serialized).unwrap();
        assert_eq!(
            deserialized, config,
            "must be able to serialize and deserialize config to toml"
        );
    }
}
