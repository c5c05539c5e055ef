//! The liquidity-provider bridge agent: fronts funds on the contract
//! chain against deposits observed on the UTXO chain, registering
//! confirmed peg-ins with the liquidity bridge contract.

use std::{fs, path::Path, str::FromStr, sync::Arc};

use alloy::signers::local::PrivateKeySigner;
use anyhow::Context;
use args::Cli;
use clap::Parser;
use config::Config;
use constants::{DEFAULT_POLL_INTERVAL, DEFAULT_THREAD_COUNT};
use secp256k1::PublicKey;
use serde::de::DeserializeOwned;
use tokio::{runtime, signal};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use tracing_subscriber::EnvFilter;

use bridge_lp_chain::rpc::{LocalQuoteSigner, RpcContractChain};
use bridge_lp_db::SqliteDb;
use bridge_lp_tracker::{
    assemble, FederationExt, LiquidityGuard, QuoteService, RegistrationExecutor,
    RegistrationManager,
};

mod args;
mod config;
mod constants;
mod rpc_server;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    info!("starting liquidity provider node");

    let config = parse_toml::<Config>(cli.config);

    let runtime = runtime::Builder::new_multi_thread()
        .worker_threads(config.num_threads.unwrap_or(DEFAULT_THREAD_COUNT).into())
        .enable_all()
        .build()
        .expect("must be able to create runtime");

    runtime.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    let db = Arc::new(
        SqliteDb::connect(&config.db.path, config.btc.network)
            .await
            .context("error connecting to quote store")?,
    );

    let wallet: PrivateKeySigner = config
        .chain
        .wallet_key
        .parse()
        .context("invalid wallet key")?;

    let chain = Arc::new(
        RpcContractChain::connect(
            &config.chain.endpoint,
            wallet.clone(),
            config.chain.lbc_addr,
            config.chain.bridge_addr,
            config.chain.required_confirmations,
        )
        .await
        .context("error connecting to contract chain")?,
    );

    let erp_keys = config
        .federation
        .erp_keys
        .iter()
        .map(|key| PublicKey::from_str(key))
        .collect::<Result<Vec<_>, _>>()
        .context("invalid erp key in config")?;

    // Assembly either fully succeeds or the process does not start: the
    // agent cannot validate deposits without a complete federation view.
    let federation = assemble(
        chain.as_ref(),
        config.btc.network,
        FederationExt {
            iris_activation_height: config.federation.iris_activation_height,
            erp_keys,
        },
    )
    .await
    .context("error assembling federation info")?;
    info!(
        size = federation.size(),
        threshold = federation.threshold(),
        address = %federation.address().canonical(),
        "federation parameters frozen for process lifetime"
    );

    let guard = LiquidityGuard::new(
        chain.clone(),
        config.provider.rsk_addr,
        config.provider.min_collateral,
        config.retry.clone(),
    );

    let executor = Arc::new(RegistrationExecutor::new(
        chain.clone(),
        Arc::new(LocalQuoteSigner::new(wallet)),
        guard.clone(),
        db.clone(),
        config.retry.clone(),
        config.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
    ));

    let cancel = CancellationToken::new();
    let manager = RegistrationManager::spawn(db.clone(), db.clone(), executor, cancel.clone());

    let service = QuoteService::new(db.clone(), db.clone(), guard, manager.clone());
    let rpc_handle =
        rpc_server::start(rpc_server::LpRpc::new(service, Arc::new(federation)), &config.rpc_addr)
            .await
            .context("error starting rpc server")?;

    wait_for_shutdown().await;
    info!("shutting down");

    // Stop accepting new submissions; in-flight polls park as
    // `Submitting` on disk and resume on the next start.
    manager.shutdown();
    if rpc_handle.stop().is_err() {
        debug!("rpc server already stopped");
    }
    db.close().await;

    info!("shutdown complete");
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("must be able to install signal handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

/// Reads and parses a TOML file from the given path into the given type
/// `T`.
///
/// # Panics
///
/// 1. If the file is not readable.
/// 2. If the contents of the file cannot be deserialized into `T`.
fn parse_toml<T>(path: impl AsRef<Path>) -> T
where
    T: std::fmt::Debug + DeserializeOwned,
{
    fs::read_to_string(path)
        .map(|raw| {
            trace!(?raw, "read config file");

            let parsed = toml::from_str::<T>(&raw).unwrap_or_else(|e| {
                panic!("failed to parse TOML file: {e:?}");
            });
            debug!(?parsed, "parsed TOML file");

            parsed
        })
        .unwrap_or_else(|_| {
            panic!("failed to read TOML file");
        })
}
