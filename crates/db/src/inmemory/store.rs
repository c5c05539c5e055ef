//! In-memory implementation of the storage traits.
//!
//! Same observable semantics as the SQLite store, minus durability. Used
//! by tests and by components that want a throwaway store.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use bridge_lp_primitives::{Quote, QuoteHash, RegistrationStatus, StateKind};
use tokio::sync::RwLock;

use crate::{
    errors::{DbError, DbResult},
    quote::QuoteDb,
    registration::RegistrationDb,
};

/// In-memory store for quotes and registration status.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDb {
    quotes: Arc<RwLock<HashMap<QuoteHash, Quote>>>,
    markers: Arc<RwLock<HashSet<QuoteHash>>>,
    statuses: Arc<RwLock<HashMap<QuoteHash, RegistrationStatus>>>,
}

impl InMemoryDb {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuoteDb for InMemoryDb {
    async fn insert_quote(&self, hash: QuoteHash, quote: &Quote) -> DbResult<()> {
        let mut quotes = self.quotes.write().await;
        if quotes.contains_key(&hash) {
            return Err(DbError::Conflict);
        }
        quotes.insert(hash, quote.clone());
        Ok(())
    }

    async fn get_quote(&self, hash: QuoteHash) -> DbResult<Quote> {
        self.quotes
            .read()
            .await
            .get(&hash)
            .cloned()
            .ok_or(DbError::NotFound)
    }
}

#[async_trait]
impl RegistrationDb for InMemoryDb {
    async fn claim_submission(&self, hash: QuoteHash) -> DbResult<bool> {
        Ok(self.markers.write().await.insert(hash))
    }

    async fn upsert_status(&self, hash: QuoteHash, status: &RegistrationStatus) -> DbResult<()> {
        self.statuses.write().await.insert(hash, status.clone());
        Ok(())
    }

    async fn fetch_status(&self, hash: QuoteHash) -> DbResult<Option<RegistrationStatus>> {
        Ok(self.statuses.read().await.get(&hash).cloned())
    }

    async fn load_in_flight(&self) -> DbResult<Vec<(QuoteHash, RegistrationStatus)>> {
        Ok(self
            .statuses
            .read()
            .await
            .iter()
            .filter(|(_, status)| {
                matches!(
                    status.state,
                    StateKind::Submitting | StateKind::AwaitingUserCall | StateKind::CallInFlight
                )
            })
            .map(|(hash, status)| (*hash, status.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use bridge_lp_primitives::test_utils::sample_quote;

    use super::*;

    #[tokio::test]
    async fn insert_once_semantics_match_sqlite() {
        let db = InMemoryDb::new();
        let quote = sample_quote();
        let hash = quote.hash();

        db.insert_quote(hash, &quote).await.unwrap();
        assert!(matches!(
            db.insert_quote(hash, &quote).await.unwrap_err(),
            DbError::Conflict
        ));
        assert_eq!(db.get_quote(hash).await.unwrap(), quote);
    }

    #[tokio::test]
    async fn unknown_hash_is_not_found() {
        let db = InMemoryDb::new();
        assert!(matches!(
            db.get_quote(QuoteHash::from_bytes([3; 32])).await.unwrap_err(),
            DbError::NotFound
        ));
    }

    #[tokio::test]
    async fn marker_claims_once() {
        let db = InMemoryDb::new();
        let hash = QuoteHash::from_bytes([4; 32]);
        assert!(db.claim_submission(hash).await.unwrap());
        assert!(!db.claim_submission(hash).await.unwrap());
    }

    #[tokio::test]
    async fn in_flight_excludes_terminal_states() {
        let db = InMemoryDb::new();
        let active = QuoteHash::from_bytes([5; 32]);
        let done = QuoteHash::from_bytes([6; 32]);

        let mut status = RegistrationStatus::pending();
        status.state = StateKind::Submitting;
        db.upsert_status(active, &status).await.unwrap();

        status.state = StateKind::Failed;
        db.upsert_status(done, &status).await.unwrap();

        let in_flight = db.load_in_flight().await.unwrap();
        assert_eq!(in_flight.len(), 1);
        assert_eq!(in_flight[0].0, active);
    }
}
