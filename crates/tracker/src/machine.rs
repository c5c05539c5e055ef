//! The per-quote registration state machine. All states, events and
//! transition rules are encoded here; accepting an event may hand back a
//! duty for the executor to perform. No I/O happens in this module.

use std::fmt::Display;

use bridge_lp_primitives::{
    DepositProof, QuoteHash, RegistrationStatus, StateKind, TxRef,
};
use thiserror::Error;

/// Why a registration ended in [`RegistrationState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The guard found insufficient liquidity at submission time.
    LiquidityExhausted(String),

    /// The guard found collateral below the configured minimum.
    CollateralShortfall(String),

    /// The stored quote no longer hashes to the inbound hash.
    HashMismatch,

    /// Gas estimation or another pre-submission check says the contract
    /// would reject the transaction; final and non-retryable.
    ContractRejected(String),

    /// Submitting the transaction itself failed; not retried because a
    /// prior attempt may already have reached the chain.
    SubmissionFailed(String),

    /// The persistent submission marker was already claimed by an earlier
    /// attempt whose outcome is unknown.
    AlreadyClaimed,

    /// The chain reported a failure receipt.
    Reverted(TxRef),

    /// The quote's deadline passed before confirmation.
    Timeout(String),

    /// Transient chain failures persisted past the retry budget.
    RetriesExhausted(String),
}

impl Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LiquidityExhausted(msg) => write!(f, "liquidity exhausted: {msg}"),
            Self::CollateralShortfall(msg) => write!(f, "collateral shortfall: {msg}"),
            Self::HashMismatch => write!(f, "stored quote does not match its hash"),
            Self::ContractRejected(msg) => write!(f, "contract rejected transaction: {msg}"),
            Self::SubmissionFailed(msg) => write!(f, "submission failed: {msg}"),
            Self::AlreadyClaimed => {
                write!(f, "submission already claimed by a previous attempt")
            }
            Self::Reverted(tx_ref) => write!(f, "transaction {tx_ref} reverted"),
            Self::Timeout(msg) => write!(f, "deadline exceeded: {msg}"),
            Self::RetriesExhausted(msg) => write!(f, "retries exhausted: {msg}"),
        }
    }
}

/// The phase a registration is in, with the payload each phase needs.
///
/// State transitions:
/// - `Pending` -> `ProofReady`
/// - `ProofReady` -> `Submitting`
/// - `Submitting` -> `Confirmed` (call-on-register quotes)
/// - `Submitting` -> `AwaitingUserCall` -> `CallInFlight` -> `Confirmed`
/// - any non-terminal -> `Failed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationState {
    /// Quote persisted, deposit not yet confirmed.
    Pending,

    /// A confirmed deposit proof has been received and is being executed.
    ProofReady {
        /// The proof material to submit.
        proof: DepositProof,
    },

    /// The registration transaction has been submitted.
    Submitting {
        /// Reference of the submitted registration transaction.
        reg_tx_ref: TxRef,
    },

    /// Registration confirmed; the stand-alone user call has not yet been
    /// submitted.
    AwaitingUserCall {
        /// Reference of the confirmed registration transaction.
        reg_tx_ref: TxRef,
    },

    /// The stand-alone user call has been submitted.
    CallInFlight {
        /// Reference of the confirmed registration transaction.
        reg_tx_ref: TxRef,
        /// Reference of the submitted user call.
        call_tx_ref: TxRef,
    },

    /// Terminal success.
    Confirmed {
        /// Reference of the registration transaction.
        reg_tx_ref: TxRef,
        /// Reference of the user call, when one was submitted separately.
        call_tx_ref: Option<TxRef>,
    },

    /// Terminal failure.
    Failed {
        /// What went wrong.
        reason: FailureReason,
    },
}

impl RegistrationState {
    /// Whether no further transition can happen.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed { .. } | Self::Failed { .. })
    }
}

/// The unified event type fed to the state machine.
#[derive(Debug, Clone)]
pub enum RegistrationEvent {
    /// The UTXO-chain connector reported a confirmed deposit for this
    /// quote.
    DepositConfirmed(DepositProof),

    /// The registration transaction was accepted by the chain.
    SubmissionAccepted(TxRef),

    /// The registration transaction confirmed at the required depth.
    RegistrationFinalized,

    /// The stand-alone user call was accepted by the chain.
    CallSubmitted(TxRef),

    /// The stand-alone user call confirmed at the required depth.
    CallFinalized,

    /// The current attempt failed terminally.
    Aborted(FailureReason),
}

/// Work the executor must perform as a result of a transition.
#[derive(Debug, Clone)]
pub enum RegistrationDuty {
    /// Run the pre-submission pipeline (guard, re-hash, parse, estimate)
    /// and submit the registration.
    ExecuteRegistration {
        /// The proof material to submit.
        proof: DepositProof,
    },

    /// Poll the registration transaction until confirmed, reverted or
    /// past deadline.
    AwaitRegistration {
        /// Reference of the submitted registration transaction.
        reg_tx_ref: TxRef,
    },

    /// Submit the stand-alone user call.
    SubmitUserCall,

    /// Poll the user call transaction until confirmed, reverted or past
    /// deadline.
    AwaitUserCall {
        /// Reference of the submitted user call.
        call_tx_ref: TxRef,
    },
}

/// The event was not applicable to the machine's current state.
///
/// For duplicate deposit confirmations this is the at-most-once
/// mechanism: the manager logs the rejection and drops the event.
#[derive(Debug, Clone, Error)]
#[error("invalid event for current state: {0}")]
pub struct TransitionErr(pub String);

/// State machine for one registration, keyed by quote hash.
#[derive(Debug, Clone)]
pub struct RegistrationSM {
    hash: QuoteHash,
    call_on_register: bool,
    state: RegistrationState,
}

impl RegistrationSM {
    /// A fresh machine in `Pending`, entered implicitly when the quote is
    /// inserted.
    pub const fn new(hash: QuoteHash, call_on_register: bool) -> Self {
        Self {
            hash,
            call_on_register,
            state: RegistrationState::Pending,
        }
    }

    /// Rebuilds a machine from a persisted status after a restart.
    ///
    /// Proof payloads are not persisted, so a crash in `ProofReady`
    /// rewinds to `Pending` and relies on the connector redelivering the
    /// proof; the submission marker still guarantees at most one
    /// submission across the restart.
    pub fn restore(hash: QuoteHash, call_on_register: bool, status: &RegistrationStatus) -> Self {
        let state = match status.state {
            StateKind::Pending | StateKind::ProofReady => RegistrationState::Pending,
            StateKind::Submitting => match status.reg_tx_ref {
                Some(reg_tx_ref) => RegistrationState::Submitting { reg_tx_ref },
                None => RegistrationState::Pending,
            },
            StateKind::AwaitingUserCall => match status.reg_tx_ref {
                Some(reg_tx_ref) => RegistrationState::AwaitingUserCall { reg_tx_ref },
                None => RegistrationState::Pending,
            },
            StateKind::CallInFlight => match (status.reg_tx_ref, status.call_tx_ref) {
                (Some(reg_tx_ref), Some(call_tx_ref)) => RegistrationState::CallInFlight {
                    reg_tx_ref,
                    call_tx_ref,
                },
                _ => RegistrationState::Pending,
            },
            StateKind::Confirmed => RegistrationState::Confirmed {
                reg_tx_ref: status.reg_tx_ref.unwrap_or(TxRef(Default::default())),
                call_tx_ref: status.call_tx_ref,
            },
            StateKind::Failed => RegistrationState::Failed {
                reason: FailureReason::ContractRejected(
                    status.reason.clone().unwrap_or_else(|| "unknown".into()),
                ),
            },
        };

        Self {
            hash,
            call_on_register,
            state,
        }
    }

    /// The quote hash this machine is keyed by.
    pub const fn hash(&self) -> QuoteHash {
        self.hash
    }

    /// Current state.
    pub const fn state(&self) -> &RegistrationState {
        &self.state
    }

    /// Flattens the current state into its persisted, queryable form.
    pub fn status(&self) -> RegistrationStatus {
        let (state, reg_tx_ref, call_tx_ref, reason) = match &self.state {
            RegistrationState::Pending => (StateKind::Pending, None, None, None),
            RegistrationState::ProofReady { .. } => (StateKind::ProofReady, None, None, None),
            RegistrationState::Submitting { reg_tx_ref } => {
                (StateKind::Submitting, Some(*reg_tx_ref), None, None)
            }
            RegistrationState::AwaitingUserCall { reg_tx_ref } => {
                (StateKind::AwaitingUserCall, Some(*reg_tx_ref), None, None)
            }
            RegistrationState::CallInFlight {
                reg_tx_ref,
                call_tx_ref,
            } => (
                StateKind::CallInFlight,
                Some(*reg_tx_ref),
                Some(*call_tx_ref),
                None,
            ),
            RegistrationState::Confirmed {
                reg_tx_ref,
                call_tx_ref,
            } => (
                StateKind::Confirmed,
                Some(*reg_tx_ref),
                *call_tx_ref,
                None,
            ),
            RegistrationState::Failed { reason } => {
                (StateKind::Failed, None, None, Some(reason.to_string()))
            }
        };

        RegistrationStatus {
            state,
            reg_tx_ref,
            call_tx_ref,
            reason,
        }
    }

    /// Feeds one event through the machine.
    ///
    /// Returns the duty the executor must now perform, if any. Rejects
    /// events that do not apply to the current state, which in particular
    /// makes a duplicate `DepositConfirmed` for an in-flight or finished
    /// registration a no-op at the caller.
    pub fn process_event(
        &mut self,
        event: RegistrationEvent,
    ) -> Result<Option<RegistrationDuty>, TransitionErr> {
        if self.state.is_terminal() {
            return Err(TransitionErr(format!(
                "machine for {} is terminal, dropping {event:?}",
                self.hash
            )));
        }

        let state = std::mem::replace(&mut self.state, RegistrationState::Pending);
        let (next, outcome) = match (state, event) {
            (RegistrationState::Pending, RegistrationEvent::DepositConfirmed(proof)) => (
                RegistrationState::ProofReady {
                    proof: proof.clone(),
                },
                Ok(Some(RegistrationDuty::ExecuteRegistration { proof })),
            ),

            (RegistrationState::ProofReady { .. }, RegistrationEvent::SubmissionAccepted(reg)) => (
                RegistrationState::Submitting { reg_tx_ref: reg },
                Ok(Some(RegistrationDuty::AwaitRegistration { reg_tx_ref: reg })),
            ),

            (
                RegistrationState::Submitting { reg_tx_ref },
                RegistrationEvent::RegistrationFinalized,
            ) => {
                if self.call_on_register {
                    (
                        RegistrationState::Confirmed {
                            reg_tx_ref,
                            call_tx_ref: None,
                        },
                        Ok(None),
                    )
                } else {
                    (
                        RegistrationState::AwaitingUserCall { reg_tx_ref },
                        Ok(Some(RegistrationDuty::SubmitUserCall)),
                    )
                }
            }

            (
                RegistrationState::AwaitingUserCall { reg_tx_ref },
                RegistrationEvent::CallSubmitted(call),
            ) => (
                RegistrationState::CallInFlight {
                    reg_tx_ref,
                    call_tx_ref: call,
                },
                Ok(Some(RegistrationDuty::AwaitUserCall { call_tx_ref: call })),
            ),

            (
                RegistrationState::CallInFlight {
                    reg_tx_ref,
                    call_tx_ref,
                },
                RegistrationEvent::CallFinalized,
            ) => (
                RegistrationState::Confirmed {
                    reg_tx_ref,
                    call_tx_ref: Some(call_tx_ref),
                },
                Ok(None),
            ),

            (_, RegistrationEvent::Aborted(reason)) => {
                (RegistrationState::Failed { reason }, Ok(None))
            }

            (state, event) => {
                let err = TransitionErr(format!(
                    "event {event:?} not applicable to state {state:?} for {}",
                    self.hash
                ));
                (state, Err(err))
            }
        };

        self.state = next;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::B256;
    use bridge_lp_primitives::test_utils::{sample_deposit_proof, sample_quote};

    use super::*;

    fn tx(n: u8) -> TxRef {
        TxRef(B256::repeat_byte(n))
    }

    fn machine(call_on_register: bool) -> RegistrationSM {
        RegistrationSM::new(sample_quote().hash(), call_on_register)
    }

    #[test]
    fn call_on_register_path_reaches_confirmed() {
        let mut sm = machine(true);

        let duty = sm
            .process_event(RegistrationEvent::DepositConfirmed(sample_deposit_proof(7)))
            .unwrap();
        assert!(matches!(
            duty,
            Some(RegistrationDuty::ExecuteRegistration { .. })
        ));

        let duty = sm
            .process_event(RegistrationEvent::SubmissionAccepted(tx(1)))
            .unwrap();
        assert!(matches!(
            duty,
            Some(RegistrationDuty::AwaitRegistration { .. })
        ));

        let duty = sm
            .process_event(RegistrationEvent::RegistrationFinalized)
            .unwrap();
        assert!(duty.is_none());
        assert!(matches!(
            sm.state(),
            RegistrationState::Confirmed {
                call_tx_ref: None,
                ..
            }
        ));
    }

    #[test]
    fn plain_registration_path_requires_follow_up_call() {
        let mut sm = machine(false);

        sm.process_event(RegistrationEvent::DepositConfirmed(sample_deposit_proof(7)))
            .unwrap();
        sm.process_event(RegistrationEvent::SubmissionAccepted(tx(1)))
            .unwrap();

        let duty = sm
            .process_event(RegistrationEvent::RegistrationFinalized)
            .unwrap();
        assert!(matches!(duty, Some(RegistrationDuty::SubmitUserCall)));

        let duty = sm
            .process_event(RegistrationEvent::CallSubmitted(tx(2)))
            .unwrap();
        assert!(matches!(duty, Some(RegistrationDuty::AwaitUserCall { .. })));

        sm.process_event(RegistrationEvent::CallFinalized).unwrap();
        assert!(matches!(
            sm.state(),
            RegistrationState::Confirmed {
                call_tx_ref: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn duplicate_deposit_confirmation_is_rejected() {
        let mut sm = machine(true);
        sm.process_event(RegistrationEvent::DepositConfirmed(sample_deposit_proof(7)))
            .unwrap();

        let err = sm
            .process_event(RegistrationEvent::DepositConfirmed(sample_deposit_proof(7)))
            .unwrap_err();
        assert!(err.0.contains("not applicable"));
    }

    fn pending() -> RegistrationSM {
        machine(true)
    }

    fn proof_ready() -> RegistrationSM {
        let mut sm = machine(true);
        sm.process_event(RegistrationEvent::DepositConfirmed(sample_deposit_proof(7)))
            .unwrap();
        sm
    }

    fn submitting() -> RegistrationSM {
        let mut sm = proof_ready();
        sm.process_event(RegistrationEvent::SubmissionAccepted(tx(1)))
            .unwrap();
        sm
    }

    #[test]
    fn abort_is_accepted_from_any_live_state() {
        let builders: [fn() -> RegistrationSM; 3] = [pending, proof_ready, submitting];
        for build in builders {
            let mut sm = build();
            sm.process_event(RegistrationEvent::Aborted(FailureReason::HashMismatch))
                .unwrap();
            assert!(matches!(sm.state(), RegistrationState::Failed { .. }));
        }
    }

    #[test]
    fn terminal_states_absorb_nothing() {
        let mut sm = machine(true);
        sm.process_event(RegistrationEvent::Aborted(FailureReason::HashMismatch))
            .unwrap();

        assert!(sm
            .process_event(RegistrationEvent::DepositConfirmed(sample_deposit_proof(7)))
            .is_err());
        assert!(sm
            .process_event(RegistrationEvent::RegistrationFinalized)
            .is_err());
    }

    #[test]
    fn status_flattens_failure_reason() {
        let mut sm = machine(true);
        sm.process_event(RegistrationEvent::Aborted(FailureReason::LiquidityExhausted(
            "short 500 wei".into(),
        )))
        .unwrap();

        let status = sm.status();
        assert_eq!(status.state, StateKind::Failed);
        assert!(status.reason.unwrap().contains("liquidity exhausted"));
    }

    #[test]
    fn restore_resumes_submitting_with_recorded_tx_ref() {
        let mut original = machine(true);
        original
            .process_event(RegistrationEvent::DepositConfirmed(sample_deposit_proof(7)))
            .unwrap();
        original
            .process_event(RegistrationEvent::SubmissionAccepted(tx(9)))
            .unwrap();

        let restored =
            RegistrationSM::restore(original.hash(), true, &original.status());
        assert_eq!(restored.state(), original.state());
    }

    #[test]
    fn restore_rewinds_proof_ready_to_pending() {
        let mut original = machine(true);
        original
            .process_event(RegistrationEvent::DepositConfirmed(sample_deposit_proof(7)))
            .unwrap();

        let mut restored =
            RegistrationSM::restore(original.hash(), true, &original.status());
        assert!(matches!(restored.state(), RegistrationState::Pending));

        // the redelivered proof is accepted again
        assert!(restored
            .process_event(RegistrationEvent::DepositConfirmed(sample_deposit_proof(7)))
            .is_ok());
    }
}
