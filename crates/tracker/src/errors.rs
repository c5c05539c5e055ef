//! Error types for the registration core.

use bridge_lp_db::DbError;
use thiserror::Error;

use crate::machine::TransitionErr;

/// Unified error type for everything that can go wrong while the manager
/// routes an event through a registration state machine.
#[derive(Debug, Error)]
pub enum ManagerErr {
    /// The store rejected a read or write.
    #[error("database error: {0}")]
    Db(#[from] DbError),

    /// The state machine rejected the event for its current state.
    #[error("state machine rejected event: {0}")]
    Transition(#[from] TransitionErr),
}
