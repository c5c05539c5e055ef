//! Core domain types for the liquidity-provider bridge agent: the quote
//! model and its content-addressed hash, the federation snapshot, deposit
//! proof material and shared aliases.

pub mod bitcoin;
pub mod deposit;
pub mod federation;
pub mod quote;
pub mod status;
pub mod types;

pub mod test_utils;

pub use crate::bitcoin::BtcAddress;
pub use deposit::DepositProof;
pub use federation::FederationInfo;
pub use quote::{ParsedQuote, Quote, QuoteHash, QuoteParams, ValidationError};
pub use status::{RegistrationStatus, StateKind};
pub use types::{BitcoinBlockHeight, TxRef};
