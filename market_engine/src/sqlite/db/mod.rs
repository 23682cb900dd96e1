//! # SQLite database methods
//!
//! "Low-level" SQLite interactions, maintained as simple functions (rather than stateful structs)
//! that accept a `&mut SqliteConnection` argument. Callers can obtain a connection from a pool,
//! or open a transaction as the need arises and call through to these functions unchanged by
//! passing `&mut *tx` as the connection argument.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod agent_stats;
pub mod bundles;
pub mod ledger;
pub mod notifications;
pub mod orders;
pub mod reports;
pub mod settings;
pub mod users;

const SQLITE_DB_URL: &str = "sqlite://data/market_store.db";

pub fn db_url() -> String {
    let result = env::var("MKT_DATABASE_URL").unwrap_or_else(|_| {
        info!("MKT_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqlxError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
