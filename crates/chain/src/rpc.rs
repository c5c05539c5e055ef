//! JSON-RPC implementation of the contract-chain client over an EVM
//! endpoint, plus the local quote signer.

use alloy::{
    contract::Error as ContractError,
    network::{EthereumWallet, TransactionBuilder},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    signers::{local::PrivateKeySigner, Signer},
    sol,
    transports::{RpcError, TransportErrorKind},
};
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use bridge_lp_primitives::{DepositProof, ParsedQuote, QuoteHash, TxRef};
use secp256k1::PublicKey;
use tracing::debug;

use crate::{
    contract::{ContractChainClient, ProviderSigner, TxStatus},
    error::{ChainError, ChainResult},
};

sol! {
    #[sol(rpc)]
    interface ILiquidityBridgeContract {
        struct PegInQuote {
            bytes fedBtcAddress;
            address lbcAddress;
            address liquidityProviderRskAddress;
            bytes btcRefundAddress;
            address rskRefundAddress;
            bytes liquidityProviderBtcAddress;
            uint256 callFee;
            uint256 penaltyFee;
            address contractAddress;
            bytes data;
            uint256 gasLimit;
            int64 nonce;
            uint256 value;
            uint32 agreementTimestamp;
            uint32 timeForDeposit;
            uint32 callTime;
            uint16 depositConfirmations;
            bool callOnRegister;
        }

        function getAvailableLiquidity(address provider) external view returns (uint256);
        function getCollateral(address provider) external view returns (uint256);
        function registerPegIn(
            PegInQuote quote,
            bytes signature,
            bytes btcRawTransaction,
            bytes partialMerkleTree,
            uint256 height
        ) external returns (uint256);
        function registerPegInWithoutTx(
            PegInQuote quote,
            bytes signature,
            bytes btcRawTransaction,
            bytes partialMerkleTree,
            uint256 height
        ) external returns (uint256);
        function callForUser(PegInQuote quote) external payable returns (bool);
    }

    #[sol(rpc)]
    interface IFederationBridge {
        function getFederationSize() external view returns (uint256);
        function getFederationThreshold() external view returns (uint256);
        function getFederatorPublicKey(uint256 index) external view returns (bytes);
        function getFederationAddress() external view returns (string);
        function getActiveFederationCreationBlockHeight() external view returns (uint256);
    }
}

/// [`ContractChainClient`] backed by an EVM JSON-RPC endpoint.
///
/// Holds one shared provider for both the liquidity bridge contract and
/// the federation bridge; submissions are signed by the wallet the
/// provider was built with.
#[derive(Debug, Clone)]
pub struct RpcContractChain {
    provider: DynProvider,
    lbc_addr: Address,
    bridge_addr: Address,
    required_confirmations: u64,
}

impl RpcContractChain {
    /// Connects to the endpoint and wires the wallet used for
    /// submissions.
    pub async fn connect(
        endpoint: &str,
        wallet_signer: PrivateKeySigner,
        lbc_addr: Address,
        bridge_addr: Address,
        required_confirmations: u64,
    ) -> ChainResult<Self> {
        debug!(endpoint, %lbc_addr, "connecting to contract chain");
        let wallet = EthereumWallet::from(wallet_signer);
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect(endpoint)
            .await
            .map_err(map_rpc_err)?
            .erased();

        Ok(Self {
            provider,
            lbc_addr,
            bridge_addr,
            required_confirmations,
        })
    }

    fn lbc(&self) -> ILiquidityBridgeContract::ILiquidityBridgeContractInstance<DynProvider> {
        ILiquidityBridgeContract::new(self.lbc_addr, self.provider.clone())
    }

    fn bridge(&self) -> IFederationBridge::IFederationBridgeInstance<DynProvider> {
        IFederationBridge::new(self.bridge_addr, self.provider.clone())
    }
}

fn sol_quote(quote: &ParsedQuote) -> ILiquidityBridgeContract::PegInQuote {
    ILiquidityBridgeContract::PegInQuote {
        fedBtcAddress: quote.fed_btc_address.clone(),
        lbcAddress: quote.lbc_address,
        liquidityProviderRskAddress: quote.liquidity_provider_rsk_address,
        btcRefundAddress: quote.btc_refund_address.clone(),
        rskRefundAddress: quote.rsk_refund_address,
        liquidityProviderBtcAddress: quote.liquidity_provider_btc_address.clone(),
        callFee: quote.call_fee,
        penaltyFee: quote.penalty_fee,
        contractAddress: quote.contract_address,
        data: quote.data.clone(),
        gasLimit: quote.gas_limit,
        nonce: quote.nonce,
        value: quote.value,
        agreementTimestamp: quote.agreement_timestamp,
        timeForDeposit: quote.time_for_deposit,
        callTime: quote.call_time,
        depositConfirmations: quote.deposit_confirmations,
        callOnRegister: quote.call_on_register,
    }
}

fn map_rpc_err(err: RpcError<TransportErrorKind>) -> ChainError {
    if err.is_error_resp() {
        // The node executed the request and rejected it; retrying cannot
        // change the outcome.
        ChainError::Fatal(err.to_string())
    } else {
        ChainError::Transient(err.to_string())
    }
}

fn map_contract_err(err: ContractError) -> ChainError {
    match err {
        ContractError::TransportError(rpc) => map_rpc_err(rpc),
        other => ChainError::Fatal(other.to_string()),
    }
}

fn to_u32(value: U256, what: &str) -> ChainResult<u32> {
    u32::try_from(value).map_err(|_| ChainError::Fatal(format!("{what} out of range: {value}")))
}

fn to_u64(value: U256, what: &str) -> ChainResult<u64> {
    u64::try_from(value).map_err(|_| ChainError::Fatal(format!("{what} out of range: {value}")))
}

#[async_trait]
impl ContractChainClient for RpcContractChain {
    async fn available_liquidity(&self, provider: Address) -> ChainResult<U256> {
        self.lbc()
            .getAvailableLiquidity(provider)
            .call()
            .await
            .map_err(map_contract_err)
    }

    async fn collateral(&self, provider: Address) -> ChainResult<U256> {
        self.lbc()
            .getCollateral(provider)
            .call()
            .await
            .map_err(map_contract_err)
    }

    async fn fed_size(&self) -> ChainResult<u32> {
        let size = self
            .bridge()
            .getFederationSize()
            .call()
            .await
            .map_err(map_contract_err)?;
        to_u32(size, "federation size")
    }

    async fn fed_threshold(&self) -> ChainResult<u32> {
        let threshold = self
            .bridge()
            .getFederationThreshold()
            .call()
            .await
            .map_err(map_contract_err)?;
        to_u32(threshold, "federation threshold")
    }

    async fn fed_public_key(&self, index: u32) -> ChainResult<PublicKey> {
        let raw = self
            .bridge()
            .getFederatorPublicKey(U256::from(index))
            .call()
            .await
            .map_err(map_contract_err)?;
        PublicKey::from_slice(&raw)
            .map_err(|e| ChainError::Fatal(format!("federator key {index} malformed: {e}")))
    }

    async fn fed_address(&self) -> ChainResult<String> {
        self.bridge()
            .getFederationAddress()
            .call()
            .await
            .map_err(map_contract_err)
    }

    async fn active_fed_block_height(&self) -> ChainResult<u64> {
        let height = self
            .bridge()
            .getActiveFederationCreationBlockHeight()
            .call()
            .await
            .map_err(map_contract_err)?;
        to_u64(height, "federation activation height")
    }

    async fn estimate_gas(&self, to: Address, value: U256, data: Bytes) -> ChainResult<u64> {
        let tx = TransactionRequest::default()
            .with_to(to)
            .with_value(value)
            .with_input(data);
        self.provider.estimate_gas(tx).await.map_err(map_rpc_err)
    }

    async fn gas_price(&self) -> ChainResult<U256> {
        let price = self.provider.get_gas_price().await.map_err(map_rpc_err)?;
        Ok(U256::from(price))
    }

    async fn register_peg_in(
        &self,
        quote: &ParsedQuote,
        signature: &Bytes,
        proof: &DepositProof,
    ) -> ChainResult<TxRef> {
        let pending = self
            .lbc()
            .registerPegIn(
                sol_quote(quote),
                signature.clone(),
                Bytes::copy_from_slice(proof.raw_tx()),
                Bytes::copy_from_slice(proof.merkle_proof()),
                U256::from(proof.block_height()),
            )
            .send()
            .await
            .map_err(map_contract_err)?;

        Ok(TxRef(*pending.tx_hash()))
    }

    async fn register_peg_in_without_tx(
        &self,
        quote: &ParsedQuote,
        signature: &Bytes,
        proof: &DepositProof,
    ) -> ChainResult<TxRef> {
        let pending = self
            .lbc()
            .registerPegInWithoutTx(
                sol_quote(quote),
                signature.clone(),
                Bytes::copy_from_slice(proof.raw_tx()),
                Bytes::copy_from_slice(proof.merkle_proof()),
                U256::from(proof.block_height()),
            )
            .send()
            .await
            .map_err(map_contract_err)?;

        Ok(TxRef(*pending.tx_hash()))
    }

    async fn call_for_user(&self, quote: &ParsedQuote) -> ChainResult<TxRef> {
        let pending = self
            .lbc()
            .callForUser(sol_quote(quote))
            .value(quote.value)
            .send()
            .await
            .map_err(map_contract_err)?;

        Ok(TxRef(*pending.tx_hash()))
    }

    async fn tx_status(&self, tx_ref: TxRef) -> ChainResult<TxStatus> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_ref.0)
            .await
            .map_err(map_rpc_err)?;

        let Some(receipt) = receipt else {
            return Ok(TxStatus::Pending);
        };

        if !receipt.status() {
            return Ok(TxStatus::Reverted);
        }

        let Some(included_at) = receipt.block_number else {
            return Ok(TxStatus::Pending);
        };

        let tip = self.provider.get_block_number().await.map_err(map_rpc_err)?;
        let depth = tip.saturating_sub(included_at) + 1;
        if depth >= self.required_confirmations {
            Ok(TxStatus::Confirmed)
        } else {
            Ok(TxStatus::Pending)
        }
    }
}

/// [`ProviderSigner`] backed by a local private key.
#[derive(Debug, Clone)]
pub struct LocalQuoteSigner {
    signer: PrivateKeySigner,
}

impl LocalQuoteSigner {
    /// Wraps a local key.
    pub const fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }
}

#[async_trait]
impl ProviderSigner for LocalQuoteSigner {
    async fn sign_quote(&self, hash: QuoteHash) -> ChainResult<Bytes> {
        let digest = B256::from(*hash.as_bytes());
        let signature = self
            .signer
            .sign_hash(&digest)
            .await
            .map_err(|e| ChainError::Fatal(format!("quote signing failed: {e}")))?;
        Ok(Bytes::copy_from_slice(&signature.as_bytes()))
    }
}
