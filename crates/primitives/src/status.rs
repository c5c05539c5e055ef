//! Persisted lifecycle status of a registration, queryable by hash.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TxRef;

/// The lifecycle phase a registration is in.
///
/// This is the flattened, persistence-friendly view of the registration
/// state machine; the machine itself carries richer payloads (the deposit
/// proof) that never need to survive a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    /// Quote persisted, deposit not yet confirmed.
    Pending,

    /// A confirmed deposit proof has been received.
    ProofReady,

    /// The registration transaction has been submitted.
    Submitting,

    /// Registration confirmed; the follow-up user call has not yet been
    /// submitted (no-call-on-register path only).
    AwaitingUserCall,

    /// The follow-up user call has been submitted.
    CallInFlight,

    /// Terminal success.
    Confirmed,

    /// Terminal failure.
    Failed,
}

impl StateKind {
    /// Whether no further transition can happen.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::ProofReady => "proof_ready",
            Self::Submitting => "submitting",
            Self::AwaitingUserCall => "awaiting_user_call",
            Self::CallInFlight => "call_in_flight",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Error produced when decoding a persisted state label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown registration state: {0}")]
pub struct ParseStateKindError(String);

impl FromStr for StateKind {
    type Err = ParseStateKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "proof_ready" => Ok(Self::ProofReady),
            "submitting" => Ok(Self::Submitting),
            "awaiting_user_call" => Ok(Self::AwaitingUserCall),
            "call_in_flight" => Ok(Self::CallInFlight),
            "confirmed" => Ok(Self::Confirmed),
            "failed" => Ok(Self::Failed),
            other => Err(ParseStateKindError(other.to_string())),
        }
    }
}

/// Queryable lifecycle status of one registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationStatus {
    /// Current phase.
    pub state: StateKind,

    /// Registration transaction reference, once submitted.
    pub reg_tx_ref: Option<TxRef>,

    /// Follow-up user call transaction reference, once submitted.
    pub call_tx_ref: Option<TxRef>,

    /// Human-readable reason, set on failure.
    pub reason: Option<String>,
}

impl RegistrationStatus {
    /// Status of a freshly accepted quote.
    pub const fn pending() -> Self {
        Self {
            state: StateKind::Pending,
            reg_tx_ref: None,
            call_tx_ref: None,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_labels_round_trip() {
        for state in [
            StateKind::Pending,
            StateKind::ProofReady,
            StateKind::Submitting,
            StateKind::AwaitingUserCall,
            StateKind::CallInFlight,
            StateKind::Confirmed,
            StateKind::Failed,
        ] {
            assert_eq!(state.to_string().parse::<StateKind>().unwrap(), state);
        }
    }

    #[test]
    fn only_confirmed_and_failed_are_terminal() {
        assert!(StateKind::Confirmed.is_terminal());
        assert!(StateKind::Failed.is_terminal());
        assert!(!StateKind::Submitting.is_terminal());
        assert!(!StateKind::Pending.is_terminal());
    }
}
