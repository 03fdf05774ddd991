use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{db::sqlite::SqliteDatabaseError, db_types::IdempotencyRecord};

pub async fn fetch_record(
    key: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<IdempotencyRecord>, SqliteDatabaseError> {
    let record = sqlx::query_as::<_, IdempotencyRecord>(
        r#"
            SELECT key, outcome, input_hash, created_at, expires_at
            FROM idempotency_records WHERE key = $1 AND expires_at > $2
        "#,
    )
    .bind(key)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(record)
}

/// First writer wins; a concurrent duplicate insert is ignored so retried requests that raced each other both see
/// one stored outcome.
pub(crate) async fn store_record(
    key: &str,
    outcome: &str,
    input_hash: &str,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query(
        r#"
            INSERT INTO idempotency_records (key, outcome, input_hash, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (key) DO NOTHING
        "#,
    )
    .bind(key)
    .bind(outcome)
    .bind(input_hash)
    .bind(now)
    .bind(expires_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn purge_expired(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, SqliteDatabaseError> {
    let res = sqlx::query("DELETE FROM idempotency_records WHERE expires_at <= $1").bind(now).execute(conn).await?;
    let purged = res.rows_affected();
    if purged > 0 {
        debug!("🗃️ Purged {purged} expired idempotency records");
    }
    Ok(purged)
}
