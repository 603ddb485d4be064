//! tally-store: SQLite persistence for suggestion patterns, feedback logs and
//! the budget tables they are read against

pub mod catalog;
pub mod database;
pub mod patterns;

pub use database::SqliteStore;
