//! SQLite-backed storage.

pub mod sqlite;
