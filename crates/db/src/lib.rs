//! Durable storage for the agent: the insert-once quote store and the
//! registration-status store, each with a SQLite and an in-memory
//! implementation.
//!
//! The quote store is the durable source of truth for "was this quote
//! ever accepted" — independent of anything on either chain — and its
//! insert-once semantics are what make registration at-most-once per
//! hash at the persistence layer.

pub mod errors;
pub mod inmemory;
pub mod persistent;
pub mod quote;
pub mod registration;

pub use errors::{DbError, DbResult};
pub use inmemory::InMemoryDb;
pub use persistent::sqlite::SqliteDb;
pub use quote::QuoteDb;
pub use registration::RegistrationDb;
