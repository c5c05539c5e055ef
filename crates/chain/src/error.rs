//! The transient/fatal split every chain access reports through.

use thiserror::Error;

/// Failure of a chain RPC interaction.
///
/// The split drives retry policy everywhere: [`Transient`] failures may be
/// retried with backoff up to a bounded budget, [`Fatal`] failures never
/// are (a reverted contract, an invalid proof or an insufficiently
/// confirmed deposit will not become valid by asking again).
///
/// [`Transient`]: ChainError::Transient
/// [`Fatal`]: ChainError::Fatal
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The endpoint misbehaved in a way that may heal: connection refused,
    /// timeout, rate limiting.
    #[error("transient chain failure: {0}")]
    Transient(String),

    /// The chain rejected the interaction itself: reverted execution,
    /// invalid call, malformed proof.
    #[error("fatal chain failure: {0}")]
    Fatal(String),
}

impl ChainError {
    /// Whether retrying can possibly help.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Convenience alias used throughout the chain-facing traits.
pub type ChainResult<T> = Result<T, ChainError>;
