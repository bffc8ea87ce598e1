//! # SQLite database methods
//!
//! "Low-level" SQLite interactions, maintained as simple functions (rather than stateful structs)
//! that accept a `&mut SqliteConnection` argument. Callers obtain a connection from a pool, or
//! open a transaction and pass it through without any other changes.
use std::env;

use log::info;
use std::str::FromStr;
use std::time::Duration;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError, SqlitePool,
};

pub mod agents;
pub mod orders;
pub mod transfers;
pub mod users;
pub mod withdrawals;

const SQLITE_DB_URL: &str = "sqlite://data/upg_store.db";

pub fn db_url() -> String {
    let result = env::var("UPG_DATABASE_URL").unwrap_or_else(|_| {
        info!("UPG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .journal_mode(SqliteJournalMode::Delete)
        .busy_timeout(Duration::from_secs(30));
    let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
    Ok(pool)
}
