//! The operations the serving layer invokes: accept a quote, query its
//! status, and deliver deposit-proof callbacks.

use std::sync::Arc;

use bridge_lp_db::{DbError, QuoteDb, RegistrationDb};
use bridge_lp_primitives::{DepositProof, Quote, QuoteHash, RegistrationStatus};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    guard::{GuardErr, LiquidityGuard},
    manager::ManagerHandle,
};

/// Why a quote could not be accepted.
#[derive(Debug, Error)]
pub enum AcceptQuoteErr {
    /// The guard rejected the commitment.
    #[error(transparent)]
    Guard(#[from] GuardErr),

    /// The store rejected the insert for a reason other than a duplicate.
    #[error(transparent)]
    Db(#[from] DbError),
}

/// A quote together with its current lifecycle status.
#[derive(Debug, Clone)]
pub struct QuoteStatusView {
    /// The stored quote.
    pub quote: Quote,

    /// Its registration lifecycle status.
    pub status: RegistrationStatus,
}

/// Entry points for the (out-of-scope) serving layer.
#[derive(Clone)]
pub struct QuoteService {
    quotes: Arc<dyn QuoteDb>,
    regs: Arc<dyn RegistrationDb>,
    guard: LiquidityGuard,
    manager: ManagerHandle,
}

impl QuoteService {
    /// Wires the service's collaborators.
    pub fn new(
        quotes: Arc<dyn QuoteDb>,
        regs: Arc<dyn RegistrationDb>,
        guard: LiquidityGuard,
        manager: ManagerHandle,
    ) -> Self {
        Self {
            quotes,
            regs,
            guard,
            manager,
        }
    }

    /// Accepts a quote: hashes it, checks the guard (advisory at this
    /// point), and persists it insert-once.
    ///
    /// A concurrent duplicate is not an error: whichever insert reached
    /// the store first won, and the hash the counterparty holds refers to
    /// that record either way.
    pub async fn accept_quote(&self, quote: Quote) -> Result<QuoteHash, AcceptQuoteErr> {
        let hash = quote.hash();
        self.guard.check(&quote).await?;

        match self.quotes.insert_quote(hash, &quote).await {
            Ok(()) => {
                self.regs
                    .upsert_status(hash, &RegistrationStatus::pending())
                    .await?;
                info!(%hash, "quote accepted");
                Ok(hash)
            }
            Err(DbError::Conflict) => {
                debug!(%hash, "quote already accepted");
                Ok(hash)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Loads a quote and its lifecycle status.
    pub async fn quote_status(&self, hash: QuoteHash) -> Result<QuoteStatusView, DbError> {
        let quote = self.quotes.get_quote(hash).await?;
        let status = self
            .regs
            .fetch_status(hash)
            .await?
            .unwrap_or_else(RegistrationStatus::pending);

        Ok(QuoteStatusView { quote, status })
    }

    /// Delivers a confirmed deposit proof, driving the registration state
    /// machine for `hash`.
    pub fn register_deposit(&self, hash: QuoteHash, proof: DepositProof) {
        self.manager.handle_deposit(hash, proof);
    }
}

/// A fresh uniqueness salt for quote construction.
pub fn new_nonce() -> i64 {
    rand::random()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy_primitives::{Address, U256};
    use bridge_lp_chain::{
        mock::{MockContractChain, MockSigner},
        RetryConfig,
    };
    use bridge_lp_db::InMemoryDb;
    use bridge_lp_primitives::{
        test_utils::{quote_with_terms, sample_deposit_proof},
        StateKind,
    };
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{executor::RegistrationExecutor, manager::RegistrationManager};

    fn service(chain: Arc<MockContractChain>, db: Arc<InMemoryDb>) -> QuoteService {
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
            guard.clone(),
            db.clone(),
            retry,
            Duration::from_millis(1),
        ));
        let manager = RegistrationManager::spawn(
            db.clone(),
            db.clone(),
            executor,
            CancellationToken::new(),
        );
        QuoteService::new(db.clone(), db, guard, manager)
    }

    #[tokio::test]
    async fn accepting_a_quote_persists_it_as_pending() {
        let db = Arc::new(InMemoryDb::new());
        let service = service(Arc::new(MockContractChain::new()), db.clone());

        let quote = quote_with_terms(1000, 10, true);
        let hash = service.accept_quote(quote.clone()).await.unwrap();

        assert_eq!(hash, quote.hash());
        let view = service.quote_status(hash).await.unwrap();
        assert_eq!(view.quote, quote);
        assert_eq!(view.status.state, StateKind::Pending);
    }

    #[tokio::test]
    async fn duplicate_acceptance_returns_the_same_hash() {
        let db = Arc::new(InMemoryDb::new());
        let service = service(Arc::new(MockContractChain::new()), db);

        let quote = quote_with_terms(1000, 10, true);
        let first = service.accept_quote(quote.clone()).await.unwrap();
        let second = service.accept_quote(quote).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn advisory_guard_rejects_oversized_quotes() {
        let chain = Arc::new(MockContractChain::new());
        chain.set_liquidity(U256::from(500));
        let service = service(chain, Arc::new(InMemoryDb::new()));

        let quote = quote_with_terms(1000, 10, true);
        let err = service.accept_quote(quote).await.unwrap_err();
        assert!(matches!(
            err,
            AcceptQuoteErr::Guard(GuardErr::LiquidityExhausted(_))
        ));
    }

    #[tokio::test]
    async fn status_of_unknown_hash_is_not_found() {
        let service = service(
            Arc::new(MockContractChain::new()),
            Arc::new(InMemoryDb::new()),
        );

        let missing = QuoteHash::from_bytes([7; 32]);
        assert!(matches!(
            service.quote_status(missing).await.unwrap_err(),
            DbError::NotFound
        ));
    }

    #[tokio::test]
    async fn deposit_callback_drives_the_lifecycle() {
        let db = Arc::new(InMemoryDb::new());
        let service = service(Arc::new(MockContractChain::new()), db.clone());

        let quote = quote_with_terms(1000, 10, true);
        let hash = service.accept_quote(quote).await.unwrap();
        service.register_deposit(hash, sample_deposit_proof(7));

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let view = service.quote_status(hash).await.unwrap();
                if view.status.state.is_terminal() {
                    assert_eq!(view.status.state, StateKind::Confirmed);
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn nonces_are_salty() {
        // collisions across a handful of draws would mean a broken rng
        let a = new_nonce();
        let b = new_nonce();
        let c = new_nonce();
        assert!(a != b || b != c);
    }
}
