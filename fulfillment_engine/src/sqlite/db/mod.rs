//! # SQLite database methods
//!
//! "Low-level" SQLite interactions, kept as simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection`. Callers obtain a connection from a pool, or open a transaction and pass `&mut *tx`
//! when several calls must be atomic together.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod customers;
pub mod inventory;
pub mod orders;

const SQLITE_DB_URL: &str = "sqlite://data/sfg_store.db";

pub fn db_url() -> String {
    let result = env::var("SFG_DATABASE_URL").unwrap_or_else(|_| {
        info!("SFG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
