//! The insert-once quote store contract.

use async_trait::async_trait;
use bridge_lp_primitives::{Quote, QuoteHash};

use crate::errors::DbResult;

/// Durable, keyed, insert-once persistence for quotes.
#[async_trait]
pub trait QuoteDb: Send + Sync {
    /// Persists a quote under its hash.
    ///
    /// Insert-once: if a quote already exists under `hash` the call fails
    /// with [`DbError::Conflict`](crate::errors::DbError::Conflict) and
    /// the existing record is left untouched.
    async fn insert_quote(&self, hash: QuoteHash, quote: &Quote) -> DbResult<()>;

    /// Loads the quote stored under `hash`, or
    /// [`DbError::NotFound`](crate::errors::DbError::NotFound).
    async fn get_quote(&self, hash: QuoteHash) -> DbResult<Quote>;
}
