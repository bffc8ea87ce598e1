//! SQLite backend for the payment engine.
pub mod db;
mod sqlite_impl;

pub use db::{db_url, new_pool};
pub use sqlite_impl::SqliteLedger;

/// Embedded schema migrations. Run by [`SqliteLedger::new_with_url`] callers that own the
/// database lifecycle (the server at startup, `test_utils` for test databases).
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./src/sqlite/migrations");
