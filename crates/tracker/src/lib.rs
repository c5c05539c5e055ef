//! The peg-in registration core: federation assembly, the liquidity and
//! collateral guard, the per-quote registration state machine and the
//! manager that drives it, plus the quote service the serving layer calls
//! into.
//!
//! Everything here takes its collaborators by constructor injection;
//! there is no ambient global state.

pub mod errors;
pub mod executor;
pub mod federation;
pub mod guard;
pub mod machine;
pub mod manager;
pub mod persister;
pub mod service;

pub use executor::RegistrationExecutor;
pub use federation::{assemble, FederationAssemblyError, FederationExt};
pub use guard::{GuardErr, LiquidityGuard};
pub use machine::{
    FailureReason, RegistrationDuty, RegistrationEvent, RegistrationSM, RegistrationState,
    TransitionErr,
};
pub use manager::{ManagerHandle, RegistrationManager};
pub use service::{AcceptQuoteErr, QuoteService, QuoteStatusView};
