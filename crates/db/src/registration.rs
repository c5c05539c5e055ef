//! Persisted registration lifecycle status, keyed by quote hash.

use async_trait::async_trait;
use bridge_lp_primitives::{QuoteHash, RegistrationStatus};

use crate::errors::DbResult;

/// Storage for registration lifecycle state.
///
/// Two concerns live here: the queryable per-hash status record, and the
/// submission marker — a compare-and-set row claimed exactly once per
/// hash immediately before the registration transaction is sent, so that
/// no crash/retry interleaving can submit the monetary action twice.
#[async_trait]
pub trait RegistrationDb: Send + Sync {
    /// Atomically claims the right to submit the registration for `hash`.
    ///
    /// Returns `true` exactly once per hash; every later call returns
    /// `false`.
    async fn claim_submission(&self, hash: QuoteHash) -> DbResult<bool>;

    /// Records the current lifecycle status for `hash`.
    async fn upsert_status(&self, hash: QuoteHash, status: &RegistrationStatus) -> DbResult<()>;

    /// Loads the recorded status for `hash`, if any.
    async fn fetch_status(&self, hash: QuoteHash) -> DbResult<Option<RegistrationStatus>>;

    /// All registrations whose submitted transactions still need to be
    /// observed — the set to resume polling for after a restart.
    async fn load_in_flight(&self) -> DbResult<Vec<(QuoteHash, RegistrationStatus)>>;
}
