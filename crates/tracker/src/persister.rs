//! Commits registration state machine snapshots to the store.

use std::sync::Arc;

use bridge_lp_db::{DbResult, RegistrationDb};
use tracing::debug;

use crate::machine::RegistrationSM;

/// Persists the flattened state of a [`RegistrationSM`] after every
/// transition, so that polling can resume across restarts without ever
/// re-submitting.
#[derive(Clone)]
pub struct RegistrationPersister {
    db: Arc<dyn RegistrationDb>,
}

impl RegistrationPersister {
    /// Wraps the registration store.
    pub fn new(db: Arc<dyn RegistrationDb>) -> Self {
        Self { db }
    }

    /// Writes the machine's current status under its hash.
    pub async fn commit(&self, machine: &RegistrationSM) -> DbResult<()> {
        let status = machine.status();
        debug!(hash = %machine.hash(), state = %status.state, "committing registration state");
        self.db.upsert_status(machine.hash(), &status).await
    }
}
