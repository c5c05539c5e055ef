//! Executes the duties handed out by the registration state machine:
//! the pre-submission pipeline, transaction submission and receipt
//! polling. Every method returns the event that must be fed back into
//! the machine.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use bridge_lp_chain::{
    with_retry, ChainError, ContractChainClient, ProviderSigner, RetryConfig, TxStatus,
};
use bridge_lp_db::RegistrationDb;
use bridge_lp_primitives::{DepositProof, ParsedQuote, Quote, QuoteHash, TxRef};
use tracing::{debug, info, warn};

use crate::{
    guard::{GuardErr, LiquidityGuard},
    machine::{FailureReason, RegistrationEvent},
};

/// Performs the chain-facing side of a registration attempt.
///
/// One executor is shared by all in-flight registrations; per-hash
/// serialization is the manager's concern.
#[derive(Clone)]
pub struct RegistrationExecutor {
    chain: Arc<dyn ContractChainClient>,
    signer: Arc<dyn ProviderSigner>,
    guard: LiquidityGuard,
    regs: Arc<dyn RegistrationDb>,
    retry: RetryConfig,
    poll_interval: Duration,
}

impl RegistrationExecutor {
    /// Wires the executor's collaborators.
    pub fn new(
        chain: Arc<dyn ContractChainClient>,
        signer: Arc<dyn ProviderSigner>,
        guard: LiquidityGuard,
        regs: Arc<dyn RegistrationDb>,
        retry: RetryConfig,
        poll_interval: Duration,
    ) -> Self {
        Self {
            chain,
            signer,
            guard,
            regs,
            retry,
            poll_interval,
        }
    }

    /// Runs the pre-submission pipeline and submits the registration.
    ///
    /// Steps: mandatory guard re-check, re-hash of the stored quote
    /// against the inbound hash, pure parse into the contract call
    /// layout, gas estimation (fatal failure means the contract would
    /// revert), persistent submission claim, then exactly one submission
    /// of the appropriate registration flavor.
    pub async fn execute_registration(
        &self,
        hash: QuoteHash,
        quote: &Quote,
        proof: &DepositProof,
    ) -> RegistrationEvent {
        if let Err(err) = self.guard.check(quote).await {
            let reason = match err {
                GuardErr::LiquidityExhausted(msg) => FailureReason::LiquidityExhausted(msg),
                GuardErr::CollateralShortfall(msg) => FailureReason::CollateralShortfall(msg),
                GuardErr::Chain(ChainError::Transient(msg)) => {
                    FailureReason::RetriesExhausted(msg)
                }
                GuardErr::Chain(ChainError::Fatal(msg)) => FailureReason::ContractRejected(msg),
            };
            return RegistrationEvent::Aborted(reason);
        }

        if quote.hash() != hash {
            warn!(%hash, "stored quote re-hashes differently, refusing to submit");
            return RegistrationEvent::Aborted(FailureReason::HashMismatch);
        }

        let parsed = ParsedQuote::from(quote);

        if let Some(reason) = self.estimate_user_call(quote).await {
            return RegistrationEvent::Aborted(reason);
        }

        // The persistent claim is what makes the submission at-most-once
        // across crashes: whoever loses the claim must not submit.
        match self.regs.claim_submission(hash).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(%hash, "submission already claimed, refusing to submit again");
                return RegistrationEvent::Aborted(FailureReason::AlreadyClaimed);
            }
            Err(err) => {
                return RegistrationEvent::Aborted(FailureReason::SubmissionFailed(
                    err.to_string(),
                ));
            }
        }

        let signature = match self.signer.sign_quote(hash).await {
            Ok(signature) => signature,
            Err(err) => {
                return RegistrationEvent::Aborted(FailureReason::SubmissionFailed(
                    err.to_string(),
                ));
            }
        };

        // Submission is deliberately not retried: a transient failure
        // leaves the outcome unknown and a second send could double-pay.
        let submitted = if quote.call_on_register() {
            self.chain.register_peg_in(&parsed, &signature, proof).await
        } else {
            self.chain
                .register_peg_in_without_tx(&parsed, &signature, proof)
                .await
        };

        match submitted {
            Ok(tx_ref) => {
                info!(%hash, %tx_ref, "registration submitted");
                RegistrationEvent::SubmissionAccepted(tx_ref)
            }
            Err(err) => {
                RegistrationEvent::Aborted(FailureReason::SubmissionFailed(err.to_string()))
            }
        }
    }

    /// Estimates the user call the registration will perform, when the
    /// quote carries one. A fatal estimation failure is a final signal
    /// that the transaction is invalid.
    async fn estimate_user_call(&self, quote: &Quote) -> Option<FailureReason> {
        if quote.contract_addr() == alloy_primitives::Address::ZERO && quote.data().is_empty() {
            return None;
        }

        let estimated = with_retry(&self.retry, "estimate_gas", || {
            self.chain
                .estimate_gas(quote.contract_addr(), quote.value(), quote.data().clone())
        })
        .await;

        match estimated {
            Ok(gas) => {
                debug!(gas, gas_limit = quote.gas_limit(), "gas estimated");
                None
            }
            Err(ChainError::Fatal(msg)) => Some(FailureReason::ContractRejected(msg)),
            Err(ChainError::Transient(msg)) => Some(FailureReason::RetriesExhausted(msg)),
        }
    }

    /// Polls a submitted transaction until it confirms, reverts or runs
    /// past the quote's deadline.
    pub async fn await_confirmation(
        &self,
        tx_ref: TxRef,
        expiry_unix: u64,
    ) -> Result<(), FailureReason> {
        loop {
            if unix_now() > expiry_unix {
                return Err(FailureReason::Timeout(format!(
                    "transaction {tx_ref} unconfirmed past deadline {expiry_unix}"
                )));
            }

            let status = with_retry(&self.retry, "tx_status", || self.chain.tx_status(tx_ref))
                .await
                .map_err(|err| match err {
                    ChainError::Transient(msg) => FailureReason::RetriesExhausted(msg),
                    ChainError::Fatal(msg) => FailureReason::ContractRejected(msg),
                })?;

            match status {
                TxStatus::Confirmed => return Ok(()),
                TxStatus::Reverted => return Err(FailureReason::Reverted(tx_ref)),
                TxStatus::Pending => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }

    /// Submits the stand-alone user call after a plain registration
    /// confirmed. Submitted once; failures surface without re-triggering
    /// the registration.
    pub async fn submit_user_call(&self, hash: QuoteHash, quote: &Quote) -> RegistrationEvent {
        let parsed = ParsedQuote::from(quote);
        match self.chain.call_for_user(&parsed).await {
            Ok(tx_ref) => {
                info!(%hash, %tx_ref, "user call submitted");
                RegistrationEvent::CallSubmitted(tx_ref)
            }
            Err(err) => {
                RegistrationEvent::Aborted(FailureReason::SubmissionFailed(err.to_string()))
            }
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
