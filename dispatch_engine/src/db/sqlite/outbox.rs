use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{db::sqlite::SqliteDatabaseError, db::traits::OutboxRow, events::DomainEvent};

/// Queues one domain event for the relay, inside the caller's transaction.
pub(crate) async fn enqueue(
    event: &DomainEvent,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let payload = serde_json::to_string(event)
        .map_err(|e| SqliteDatabaseError::QueryError(format!("Could not serialize event {}: {e}", event.event_id)))?;
    sqlx::query(
        r#"
            INSERT INTO outbox (event_id, topic, bus_key, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&event.event_id)
    .bind(event.topic())
    .bind(event.key())
    .bind(payload)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_unpublished(
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OutboxRow>, SqliteDatabaseError> {
    let rows = sqlx::query_as::<_, OutboxRow>(
        r#"
            SELECT id, event_id, topic, bus_key, payload, created_at, published_at
            FROM outbox WHERE published_at IS NULL ORDER BY id ASC LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub(crate) async fn mark_published(
    ids: &[i64],
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    if ids.is_empty() {
        return Ok(());
    }
    let mut builder = QueryBuilder::new("UPDATE outbox SET published_at = ");
    builder.push_bind(now);
    builder.push(" WHERE published_at IS NULL AND id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    builder.push(")");
    builder.build().execute(conn).await?;
    Ok(())
}
