//! Bootstraps the RPC surface the serving layer talks to.

use std::sync::Arc;

use bridge_lp_db::DbError;
use bridge_lp_primitives::{
    DepositProof, FederationInfo, Quote, QuoteHash, QuoteParams, RegistrationStatus,
};
use bridge_lp_tracker::{AcceptQuoteErr, QuoteService};
use jsonrpsee::{
    core::{async_trait, RpcResult},
    proc_macros::rpc,
    server::{Server, ServerHandle},
    types::{ErrorCode, ErrorObjectOwned},
};
use tracing::info;

/// The operations exposed to the serving layer: create-quote,
/// get-quote-status and the deposit-proof callback.
#[rpc(server, namespace = "lp")]
pub(crate) trait LpApi {
    /// Validates, hashes and persists a quote; returns its hash.
    #[method(name = "acceptQuote")]
    async fn accept_quote(&self, params: QuoteParams) -> RpcResult<QuoteHash>;

    /// Returns the lifecycle status recorded for a quote.
    #[method(name = "quoteStatus")]
    async fn quote_status(&self, hash: QuoteHash) -> RpcResult<RegistrationStatus>;

    /// Delivers a confirmed deposit proof for a quote.
    #[method(name = "registerDeposit")]
    async fn register_deposit(&self, hash: QuoteHash, proof: DepositProof) -> RpcResult<()>;

    /// Returns the derived federation deposit address.
    #[method(name = "federationAddress")]
    async fn federation_address(&self) -> RpcResult<String>;
}

/// RPC implementation over the quote service and the frozen federation
/// snapshot.
pub(crate) struct LpRpc {
    service: QuoteService,
    federation: Arc<FederationInfo>,
}

impl LpRpc {
    pub(crate) fn new(service: QuoteService, federation: Arc<FederationInfo>) -> Self {
        Self {
            service,
            federation,
        }
    }
}

#[async_trait]
impl LpApiServer for LpRpc {
    async fn accept_quote(&self, params: QuoteParams) -> RpcResult<QuoteHash> {
        let quote = Quote::new(params).map_err(invalid_params)?;
        self.service.accept_quote(quote).await.map_err(|err| match err {
            AcceptQuoteErr::Guard(guard) => rejected(guard),
            AcceptQuoteErr::Db(db) => internal(db),
        })
    }

    async fn quote_status(&self, hash: QuoteHash) -> RpcResult<RegistrationStatus> {
        let view = self.service.quote_status(hash).await.map_err(|err| match err {
            DbError::NotFound => not_found(hash),
            other => internal(other),
        })?;
        Ok(view.status)
    }

    async fn register_deposit(&self, hash: QuoteHash, proof: DepositProof) -> RpcResult<()> {
        self.service.register_deposit(hash, proof);
        Ok(())
    }

    async fn federation_address(&self) -> RpcResult<String> {
        Ok(self.federation.address().canonical())
    }
}

fn invalid_params(err: impl std::fmt::Display) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(ErrorCode::InvalidParams.code(), err.to_string(), None::<()>)
}

fn rejected(err: impl std::fmt::Display) -> ErrorObjectOwned {
    // application-defined code for guard rejections
    ErrorObjectOwned::owned(-32050, err.to_string(), None::<()>)
}

fn not_found(hash: QuoteHash) -> ErrorObjectOwned {
    // application-defined code for unknown quote hashes
    ErrorObjectOwned::owned(-32051, format!("no quote under hash {hash}"), None::<()>)
}

fn internal(err: impl std::fmt::Display) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(ErrorCode::InternalError.code(), err.to_string(), None::<()>)
}

/// Starts the RPC server.
pub(crate) async fn start(rpc: LpRpc, rpc_addr: &str) -> anyhow::Result<ServerHandle> {
    info!("starting rpc server at {rpc_addr}");
    let server = Server::builder().build(rpc_addr).await?;
    let handle = server.start(rpc.into_rpc());
    Ok(handle)
}
