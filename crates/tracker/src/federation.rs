//! Startup assembly of the federation parameter snapshot.

use bitcoin::Network;
use bridge_lp_chain::ContractChainClient;
use bridge_lp_primitives::{federation::InvalidFederationInfo, BtcAddress, FederationInfo};
use secp256k1::PublicKey;
use thiserror::Error;
use tracing::debug;

use bridge_lp_chain::ChainError;

/// Externally configured federation extension fields that cannot be read
/// from the chain: they govern how the post-activation federation address
/// is derived.
#[derive(Debug, Clone)]
pub struct FederationExt {
    /// Activation height of the Iris network upgrade.
    pub iris_activation_height: u64,

    /// Emergency-recovery-protocol public keys.
    pub erp_keys: Vec<PublicKey>,
}

/// Failure of federation assembly. Fatal at startup: the agent cannot
/// validate deposits or proofs without a complete federation view.
#[derive(Debug, Error)]
pub enum FederationAssemblyError {
    /// Reading the federation size failed.
    #[error("failed to fetch federation size: {0}")]
    Size(#[source] ChainError),

    /// Reading the public key at `index` failed.
    #[error("failed to fetch federation public key {index}: {source}")]
    PublicKey {
        /// Index of the failing read.
        index: u32,
        /// Underlying chain failure.
        source: ChainError,
    },

    /// Reading the signing threshold failed.
    #[error("failed to fetch federation threshold: {0}")]
    Threshold(#[source] ChainError),

    /// Reading the derived federation address failed.
    #[error("failed to fetch federation address: {0}")]
    AddressFetch(#[source] ChainError),

    /// The fetched federation address does not parse for the configured
    /// network.
    #[error("federation address does not parse: {0}")]
    AddressParse(String),

    /// Reading the activation block height failed.
    #[error("failed to fetch federation activation height: {0}")]
    ActivationHeight(#[source] ChainError),

    /// The fetched parameters are self-contradictory.
    #[error(transparent)]
    Invalid(#[from] InvalidFederationInfo),
}

/// Assembles the federation snapshot from the contract chain.
///
/// Invoked once at startup. Reads run sequentially — size first, then
/// each key by index, then threshold, address and activation height — and
/// any failure aborts the whole assembly. Either a complete
/// [`FederationInfo`] comes back or nothing does; no partial snapshot is
/// ever observable.
pub async fn assemble(
    chain: &dyn ContractChainClient,
    network: Network,
    ext: FederationExt,
) -> Result<FederationInfo, FederationAssemblyError> {
    debug!("assembling federation info");

    let size = chain.fed_size().await.map_err(FederationAssemblyError::Size)?;

    let mut public_keys = Vec::with_capacity(size as usize);
    for index in 0..size {
        let key = chain
            .fed_public_key(index)
            .await
            .map_err(|source| FederationAssemblyError::PublicKey { index, source })?;
        public_keys.push(key);
    }

    let threshold = chain
        .fed_threshold()
        .await
        .map_err(FederationAssemblyError::Threshold)?;

    let address_text = chain
        .fed_address()
        .await
        .map_err(FederationAssemblyError::AddressFetch)?;
    let address = BtcAddress::parse(&address_text, network)
        .map_err(|e| FederationAssemblyError::AddressParse(e.to_string()))?;

    let activation_height = chain
        .active_fed_block_height()
        .await
        .map_err(FederationAssemblyError::ActivationHeight)?;

    let info = FederationInfo::new(
        size,
        threshold,
        public_keys,
        address,
        activation_height,
        ext.iris_activation_height,
        ext.erp_keys,
    )?;

    debug!(size = info.size(), threshold = info.threshold(), "federation info assembled");
    Ok(info)
}

#[cfg(test)]
mod tests {
    use bridge_lp_chain::mock::MockContractChain;

    use super::*;

    fn ext() -> FederationExt {
        FederationExt {
            iris_activation_height: 1_500_000,
            erp_keys: vec![],
        }
    }

    #[tokio::test]
    async fn assembles_complete_snapshot() {
        let chain = MockContractChain::new();
        let info = assemble(&chain, Network::Bitcoin, ext()).await.unwrap();

        assert_eq!(info.size(), 3);
        assert_eq!(info.threshold(), 2);
        assert_eq!(info.public_keys().len(), 3);
        assert_eq!(info.iris_activation_height(), 1_500_000);
    }

    #[tokio::test]
    async fn any_key_read_failure_aborts_the_whole_assembly() {
        let chain = MockContractChain::new();
        chain.fail_fed_key_at(1, ChainError::Fatal("node refused".into()));

        let err = assemble(&chain, Network::Bitcoin, ext()).await.unwrap_err();
        assert!(matches!(
            err,
            FederationAssemblyError::PublicKey { index: 1, .. }
        ));
    }

    #[tokio::test]
    async fn unparseable_address_aborts() {
        let chain = MockContractChain::new();
        chain.set_fed_address("not-an-address".into());

        let err = assemble(&chain, Network::Bitcoin, ext()).await.unwrap_err();
        assert!(matches!(err, FederationAssemblyError::AddressParse(_)));
    }

    #[tokio::test]
    async fn contradictory_parameters_abort() {
        let chain = MockContractChain::new();
        chain.set_fed_threshold(9);

        let err = assemble(&chain, Network::Bitcoin, ext()).await.unwrap_err();
        assert!(matches!(
            err,
            FederationAssemblyError::Invalid(InvalidFederationInfo::ThresholdExceedsSize { .. })
        ));
    }
}
