//! The liquidity and collateral guard gating provider commitments.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use bridge_lp_chain::{with_retry, ChainError, ContractChainClient, RetryConfig};
use bridge_lp_primitives::Quote;
use thiserror::Error;
use tracing::debug;

/// Why a quote cannot be committed to right now.
#[derive(Debug, Error)]
pub enum GuardErr {
    /// Committed value plus fee exceeds the provider's available
    /// liquidity. The quote may become acceptable again when headroom
    /// returns.
    #[error("liquidity exhausted: {0}")]
    LiquidityExhausted(String),

    /// The provider's locked collateral is below the configured minimum.
    #[error("collateral below minimum: {0}")]
    CollateralShortfall(String),

    /// The balances could not be read at all.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// A point-in-time read of the provider's balances.
///
/// Never cached: both values move under concurrent registrations and
/// external collateral top-ups, so every check reads fresh.
#[derive(Debug, Clone, Copy)]
struct CollateralSnapshot {
    available_liquidity: U256,
    collateral: U256,
}

/// Read-only checks against the provider's liquidity and collateral.
///
/// Advisory at quote-acceptance time, mandatory immediately before
/// registration submission: liquidity may have been consumed by other
/// quotes accepted in between.
#[derive(Clone)]
pub struct LiquidityGuard {
    chain: Arc<dyn ContractChainClient>,
    provider_addr: Address,
    min_collateral: U256,
    retry: RetryConfig,
}

impl LiquidityGuard {
    /// Builds a guard for the given provider address.
    pub fn new(
        chain: Arc<dyn ContractChainClient>,
        provider_addr: Address,
        min_collateral: U256,
        retry: RetryConfig,
    ) -> Self {
        Self {
            chain,
            provider_addr,
            min_collateral,
            retry,
        }
    }

    async fn snapshot(&self) -> Result<CollateralSnapshot, ChainError> {
        let available_liquidity = with_retry(&self.retry, "available_liquidity", || {
            self.chain.available_liquidity(self.provider_addr)
        })
        .await?;
        let collateral = with_retry(&self.retry, "collateral", || {
            self.chain.collateral(self.provider_addr)
        })
        .await?;

        Ok(CollateralSnapshot {
            available_liquidity,
            collateral,
        })
    }

    /// Checks whether the provider can commit to `quote` right now.
    ///
    /// Rejects when value plus fee exceeds available liquidity (equality
    /// is accepted) or when collateral is below the configured minimum.
    pub async fn check(&self, quote: &Quote) -> Result<(), GuardErr> {
        let snapshot = self.snapshot().await?;
        let committed = quote
            .value()
            .checked_add(quote.call_fee())
            .ok_or_else(|| GuardErr::LiquidityExhausted("value plus fee overflows".into()))?;

        debug!(
            %committed,
            available = %snapshot.available_liquidity,
            collateral = %snapshot.collateral,
            "guard check"
        );

        if committed > snapshot.available_liquidity {
            return Err(GuardErr::LiquidityExhausted(format!(
                "quote commits {committed} wei but only {} wei available",
                snapshot.available_liquidity
            )));
        }

        if snapshot.collateral < self.min_collateral {
            return Err(GuardErr::CollateralShortfall(format!(
                "{} wei locked, {} wei required",
                snapshot.collateral, self.min_collateral
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bridge_lp_chain::mock::MockContractChain;
    use bridge_lp_primitives::test_utils::quote_with_terms;

    use super::*;

    fn guard(chain: Arc<MockContractChain>) -> LiquidityGuard {
        LiquidityGuard::new(
            chain,
            Address::repeat_byte(0x01),
            U256::from(100),
            RetryConfig::default().with_backoff_period(Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn accepts_when_headroom_exists() {
        let chain = Arc::new(MockContractChain::new());
        chain.set_liquidity(U256::from(2000));

        let quote = quote_with_terms(1000, 10, true);
        guard(chain).check(&quote).await.unwrap();
    }

    #[tokio::test]
    async fn accepts_exact_equality() {
        let chain = Arc::new(MockContractChain::new());
        chain.set_liquidity(U256::from(1010));

        let quote = quote_with_terms(1000, 10, true);
        guard(chain).check(&quote).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_one_wei_over() {
        let chain = Arc::new(MockContractChain::new());
        chain.set_liquidity(U256::from(1009));

        let quote = quote_with_terms(1000, 10, true);
        let err = guard(chain).check(&quote).await.unwrap_err();
        assert!(matches!(err, GuardErr::LiquidityExhausted(_)));
    }

    #[tokio::test]
    async fn rejects_collateral_below_minimum() {
        let chain = Arc::new(MockContractChain::new());
        chain.set_collateral(U256::from(99));

        let quote = quote_with_terms(10, 1, true);
        let err = guard(chain).check(&quote).await.unwrap_err();
        assert!(matches!(err, GuardErr::CollateralShortfall(_)));
    }

    #[tokio::test]
    async fn transient_read_failures_heal_within_budget() {
        let chain = Arc::new(MockContractChain::new());
        chain.fail_next_liquidity_reads(2);

        let quote = quote_with_terms(1000, 10, true);
        guard(chain).check(&quote).await.unwrap();
    }

    #[tokio::test]
    async fn reads_fresh_on_every_check() {
        let chain = Arc::new(MockContractChain::new());
        let guard = guard(chain.clone());
        let quote = quote_with_terms(1000, 10, true);

        guard.check(&quote).await.unwrap();
        chain.set_liquidity(U256::from(500));
        assert!(guard.check(&quote).await.is_err());
    }
}
