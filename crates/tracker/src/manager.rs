//! The registration manager: routes deposit-proof callbacks and executor
//! outcomes into the per-quote state machines, persists every transition,
//! and recovers in-flight registrations after a restart.
//!
//! Transitions are serialized per hash by construction: all events flow
//! through one loop, and each machine has at most one duty task in
//! flight whose outcome is the only source of its next event. Different
//! hashes proceed fully in parallel in their own duty tasks.

use std::{collections::HashMap, sync::Arc};

use bridge_lp_db::{DbError, QuoteDb, RegistrationDb};
use bridge_lp_primitives::{DepositProof, Quote, QuoteHash};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    errors::ManagerErr,
    executor::RegistrationExecutor,
    machine::{RegistrationDuty, RegistrationEvent, RegistrationSM, RegistrationState},
    persister::RegistrationPersister,
};

/// Handle used to feed the manager and to shut it down.
#[derive(Clone)]
pub struct ManagerHandle {
    events: mpsc::UnboundedSender<(QuoteHash, RegistrationEvent)>,
    cancel: CancellationToken,
}

impl ManagerHandle {
    /// Feeds a confirmed deposit proof for `hash`.
    ///
    /// Duplicate deliveries for an already in-flight or finished
    /// registration are rejected by the state machine and dropped.
    pub fn handle_deposit(&self, hash: QuoteHash, proof: DepositProof) {
        if self
            .events
            .send((hash, RegistrationEvent::DepositConfirmed(proof)))
            .is_err()
        {
            warn!(%hash, "registration manager is gone, dropping deposit proof");
        }
    }

    /// Stops accepting new submissions and abandons in-flight polls.
    /// Their recorded state remains `Submitting` for resumption on the
    /// next start.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Spawns and owns the manager event loop.
#[derive(Debug)]
pub struct RegistrationManager;

impl RegistrationManager {
    /// Starts the manager loop and returns its handle.
    ///
    /// Recovery runs first: every persisted in-flight registration
    /// resumes by re-polling its recorded transaction reference — never
    /// by re-submitting.
    pub fn spawn(
        quotes: Arc<dyn QuoteDb>,
        regs: Arc<dyn RegistrationDb>,
        executor: Arc<RegistrationExecutor>,
        cancel: CancellationToken,
    ) -> ManagerHandle {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let handle = ManagerHandle {
            events: events_tx.clone(),
            cancel: cancel.clone(),
        };

        tokio::spawn(async move {
            let mut ctx = ManagerCtx {
                persister: RegistrationPersister::new(regs.clone()),
                quotes,
                regs,
                executor,
                machines: HashMap::new(),
                events_tx,
                cancel: cancel.clone(),
            };

            if let Err(err) = ctx.recover().await {
                error!("failed to recover in-flight registrations: {err}");
            }

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("registration manager shutting down");
                        break;
                    }
                    maybe = events_rx.recv() => match maybe {
                        Some((hash, event)) => match ctx.process(hash, event).await {
                            Ok(()) => {}
                            Err(ManagerErr::Transition(err)) => {
                                // Duplicate or stale event; at-most-once
                                // depends on dropping it here.
                                warn!(%hash, "dropping event: {err}");
                            }
                            Err(err) => error!(%hash, "failed to process event: {err}"),
                        },
                        None => break,
                    }
                }
            }
        });

        handle
    }
}

struct ManagerCtx {
    quotes: Arc<dyn QuoteDb>,
    regs: Arc<dyn RegistrationDb>,
    executor: Arc<RegistrationExecutor>,
    persister: RegistrationPersister,
    machines: HashMap<QuoteHash, RegistrationSM>,
    events_tx: mpsc::UnboundedSender<(QuoteHash, RegistrationEvent)>,
    cancel: CancellationToken,
}

impl ManagerCtx {
    async fn process(
        &mut self,
        hash: QuoteHash,
        event: RegistrationEvent,
    ) -> Result<(), ManagerErr> {
        let quote = match self.quotes.get_quote(hash).await {
            Ok(quote) => quote,
            Err(DbError::NotFound) => {
                warn!(%hash, "event for unknown quote, ignoring");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        if !self.machines.contains_key(&hash) {
            let machine = match self.regs.fetch_status(hash).await? {
                Some(status) => RegistrationSM::restore(hash, quote.call_on_register(), &status),
                None => RegistrationSM::new(hash, quote.call_on_register()),
            };
            self.machines.insert(hash, machine);
        }

        let (duty, snapshot) = {
            let Some(machine) = self.machines.get_mut(&hash) else {
                return Ok(());
            };
            let duty = machine.process_event(event)?;
            (duty, machine.clone())
        };

        self.persister.commit(&snapshot).await?;

        if let Some(duty) = duty {
            self.spawn_duty(hash, quote, duty);
        }

        Ok(())
    }

    fn spawn_duty(&self, hash: QuoteHash, quote: Quote, duty: RegistrationDuty) {
        let executor = self.executor.clone();
        let events = self.events_tx.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let work = async {
                match duty {
                    RegistrationDuty::ExecuteRegistration { proof } => {
                        executor.execute_registration(hash, &quote, &proof).await
                    }
                    RegistrationDuty::AwaitRegistration { reg_tx_ref } => {
                        match executor
                            .await_confirmation(reg_tx_ref, quote.expiry_timestamp())
                            .await
                        {
                            Ok(()) => RegistrationEvent::RegistrationFinalized,
                            Err(reason) => RegistrationEvent::Aborted(reason),
                        }
                    }
                    RegistrationDuty::SubmitUserCall => {
                        executor.submit_user_call(hash, &quote).await
                    }
                    RegistrationDuty::AwaitUserCall { call_tx_ref } => {
                        match executor
                            .await_confirmation(call_tx_ref, quote.expiry_timestamp())
                            .await
                        {
                            Ok(()) => RegistrationEvent::CallFinalized,
                            Err(reason) => RegistrationEvent::Aborted(reason),
                        }
                    }
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(%hash, "duty abandoned on shutdown");
                }
                event = work => {
                    let _ = events.send((hash, event));
                }
            }
        });
    }

    async fn recover(&mut self) -> Result<(), ManagerErr> {
        let in_flight = self.regs.load_in_flight().await?;
        for (hash, status) in in_flight {
            let quote = match self.quotes.get_quote(hash).await {
                Ok(quote) => quote,
                Err(DbError::NotFound) => {
                    error!(%hash, "in-flight registration without a stored quote");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let machine = RegistrationSM::restore(hash, quote.call_on_register(), &status);
            let duty = match machine.state() {
                RegistrationState::Submitting { reg_tx_ref } => {
                    Some(RegistrationDuty::AwaitRegistration {
                        reg_tx_ref: *reg_tx_ref,
                    })
                }
                RegistrationState::AwaitingUserCall { .. } => {
                    Some(RegistrationDuty::SubmitUserCall)
                }
                RegistrationState::CallInFlight { call_tx_ref, .. } => {
                    Some(RegistrationDuty::AwaitUserCall {
                        call_tx_ref: *call_tx_ref,
                    })
                }
                _ => None,
            };

            info!(%hash, state = %machine.status().state, "recovered in-flight registration");
            self.machines.insert(hash, machine);
            if let Some(duty) = duty {
                self.spawn_duty(hash, quote, duty);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy_primitives::{Address, B256, U256};
    use bridge_lp_chain::{
        mock::{MockContractChain, MockSigner},
        ChainError, RetryConfig, TxStatus,
    };
    use bridge_lp_db::InMemoryDb;
    use bridge_lp_primitives::{
        test_utils::{quote_with_terms, sample_deposit_proof},
        RegistrationStatus, StateKind, TxRef,
    };

    use super::*;
    use crate::guard::LiquidityGuard;

    struct Rig {
        chain: Arc<MockContractChain>,
        db: Arc<InMemoryDb>,
        handle: ManagerHandle,
    }

    fn spawn_rig(chain: Arc<MockContractChain>, db: Arc<InMemoryDb>) -> ManagerHandle {
        let retry = RetryConfig::default().with_backoff_period(Duration::from_millis(1));
        let guard = LiquidityGuard::new(
            chain.clone(),
            Address::repeat_byte(0x01),
            U256::from(100),
            retry.clone(),
        );
        let executor = Arc::new(RegistrationExecutor::new(
            chain,
            Arc::new(MockSigner),
            guard,
            db.clone(),
            retry,
            Duration::from_millis(1),
        ));
        RegistrationManager::spawn(db.clone(), db, executor, CancellationToken::new())
    }

    async fn rig() -> Rig {
        let chain = Arc::new(MockContractChain::new());
        let db = Arc::new(InMemoryDb::new());
        let handle = spawn_rig(chain.clone(), db.clone());
        Rig { chain, db, handle }
    }

    async fn accept(db: &InMemoryDb, quote: &Quote) -> QuoteHash {
        let hash = quote.hash();
        db.insert_quote(hash, quote).await.unwrap();
        db.upsert_status(hash, &RegistrationStatus::pending())
            .await
            .unwrap();
        hash
    }

    async fn wait_for_terminal(db: &InMemoryDb, hash: QuoteHash) -> RegistrationStatus {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(status) = db.fetch_status(hash).await.unwrap() {
                    if status.state.is_terminal() {
                        return status;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("registration must reach a terminal state")
    }

    #[tokio::test]
    async fn full_lifecycle_reaches_confirmed() {
        let rig = rig().await;
        let quote = quote_with_terms(1000, 10, true);
        let hash = accept(&rig.db, &quote).await;

        rig.handle.handle_deposit(hash, sample_deposit_proof(7));

        let status = wait_for_terminal(&rig.db, hash).await;
        assert_eq!(status.state, StateKind::Confirmed);
        assert!(status.reg_tx_ref.is_some());
        assert_eq!(rig.chain.register_calls(), 1);
    }

    #[tokio::test]
    async fn liquidity_drop_before_proof_fails_the_quote() {
        let rig = rig().await;
        let quote = quote_with_terms(1000, 10, true);
        let hash = accept(&rig.db, &quote).await;

        // headroom evaporates after acceptance, before the proof arrives
        rig.chain.set_liquidity(U256::from(500));
        rig.handle.handle_deposit(hash, sample_deposit_proof(7));

        let status = wait_for_terminal(&rig.db, hash).await;
        assert_eq!(status.state, StateKind::Failed);
        assert!(status.reason.unwrap().contains("liquidity exhausted"));
        assert_eq!(rig.chain.total_registrations(), 0);
    }

    #[tokio::test]
    async fn gas_estimation_failure_fails_without_submitting() {
        let rig = rig().await;
        let quote = quote_with_terms(1000, 10, true);
        let hash = accept(&rig.db, &quote).await;

        rig.chain
            .fail_gas_estimation(ChainError::Fatal("execution reverted".into()));
        rig.handle.handle_deposit(hash, sample_deposit_proof(7));

        let status = wait_for_terminal(&rig.db, hash).await;
        assert_eq!(status.state, StateKind::Failed);
        assert!(status.reason.unwrap().contains("contract rejected"));
        assert_eq!(rig.chain.total_registrations(), 0);
    }

    #[tokio::test]
    async fn plain_quote_submits_user_call_exactly_once() {
        let rig = rig().await;
        let quote = quote_with_terms(1000, 10, false);
        let hash = accept(&rig.db, &quote).await;

        rig.handle.handle_deposit(hash, sample_deposit_proof(7));

        let status = wait_for_terminal(&rig.db, hash).await;
        assert_eq!(status.state, StateKind::Confirmed);
        assert!(status.call_tx_ref.is_some());
        assert_eq!(rig.chain.register_without_tx_calls(), 1);
        assert_eq!(rig.chain.register_calls(), 0);
        assert_eq!(rig.chain.call_for_user_calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_duplicate_proofs_submit_exactly_once() {
        let rig = rig().await;
        let quote = quote_with_terms(1000, 10, true);
        let hash = accept(&rig.db, &quote).await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handle = rig.handle.clone();
            let proof = sample_deposit_proof(7);
            tasks.push(tokio::spawn(async move {
                handle.handle_deposit(hash, proof);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let status = wait_for_terminal(&rig.db, hash).await;
        assert_eq!(status.state, StateKind::Confirmed);
        assert_eq!(rig.chain.total_registrations(), 1);
    }

    #[tokio::test]
    async fn reverted_registration_fails_terminally() {
        let rig = rig().await;
        rig.chain.script_statuses([TxStatus::Reverted]);
        let quote = quote_with_terms(1000, 10, true);
        let hash = accept(&rig.db, &quote).await;

        rig.handle.handle_deposit(hash, sample_deposit_proof(7));

        let status = wait_for_terminal(&rig.db, hash).await;
        assert_eq!(status.state, StateKind::Failed);
        assert!(status.reason.unwrap().contains("reverted"));
    }

    #[tokio::test]
    async fn independent_quotes_proceed_in_parallel() {
        let rig = rig().await;
        let first = quote_with_terms(400, 10, true);
        let second = quote_with_terms(500, 10, true);
        let h1 = accept(&rig.db, &first).await;
        let h2 = accept(&rig.db, &second).await;

        rig.handle.handle_deposit(h1, sample_deposit_proof(7));
        rig.handle.handle_deposit(h2, sample_deposit_proof(8));

        assert_eq!(wait_for_terminal(&rig.db, h1).await.state, StateKind::Confirmed);
        assert_eq!(wait_for_terminal(&rig.db, h2).await.state, StateKind::Confirmed);
        assert_eq!(rig.chain.register_calls(), 2);
    }

    #[tokio::test]
    async fn restart_resumes_polling_without_resubmitting() {
        let chain = Arc::new(MockContractChain::new());
        let db = Arc::new(InMemoryDb::new());

        // a previous process run submitted and crashed mid-poll
        let quote = quote_with_terms(1000, 10, true);
        let hash = quote.hash();
        db.insert_quote(hash, &quote).await.unwrap();
        db.claim_submission(hash).await.unwrap();
        db.upsert_status(
            hash,
            &RegistrationStatus {
                state: StateKind::Submitting,
                reg_tx_ref: Some(TxRef(B256::repeat_byte(0x0c))),
                call_tx_ref: None,
                reason: None,
            },
        )
        .await
        .unwrap();

        let _handle = spawn_rig(chain.clone(), db.clone());

        let status = wait_for_terminal(&db, hash).await;
        assert_eq!(status.state, StateKind::Confirmed);
        assert_eq!(chain.total_registrations(), 0);
    }

    #[tokio::test]
    async fn proof_for_unknown_quote_is_ignored() {
        let rig = rig().await;
        let unknown = QuoteHash::from_bytes([0x42; 32]);

        rig.handle.handle_deposit(unknown, sample_deposit_proof(7));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(rig.db.fetch_status(unknown).await.unwrap(), None);
        assert_eq!(rig.chain.total_registrations(), 0);
    }

    #[tokio::test]
    async fn shutdown_leaves_submitting_state_recorded() {
        let rig = rig().await;
        // never confirms while we are watching
        rig.chain.script_statuses(vec![TxStatus::Pending; 100_000]);
        let quote = quote_with_terms(1000, 10, true);
        let hash = accept(&rig.db, &quote).await;

        rig.handle.handle_deposit(hash, sample_deposit_proof(7));

        // wait until the submission is recorded, then shut down mid-poll
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(status) = rig.db.fetch_status(hash).await.unwrap() {
                    if status.state == StateKind::Submitting {
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        rig.handle.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let status = rig.db.fetch_status(hash).await.unwrap().unwrap();
        assert_eq!(status.state, StateKind::Submitting);
        assert!(status.reg_tx_ref.is_some());
    }
}
