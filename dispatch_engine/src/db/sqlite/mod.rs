pub mod db;
mod errors;

pub mod assignments;
pub mod evidence;
pub mod idempotency;
pub mod items;
pub mod order_events;
pub mod orders;
pub mod outbox;
pub mod stops;

use std::env;

pub use db::SqliteDatabase;
pub use errors::SqliteDatabaseError;
use log::info;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

const SQLITE_DB_URL: &str = "sqlite://data/dispatch.db";

pub fn db_url() -> String {
    let result = env::var("PD_DATABASE_URL").unwrap_or_else(|_| {
        info!("PD_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqliteDatabaseError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
