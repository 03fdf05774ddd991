use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{CorrelationId, OrderEvent, Requester},
    helpers::geo::GeoPoint,
};

/// Appends one row to the audit ledger. There is deliberately no update or delete counterpart in this module.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn append_event(
    order_pk: i64,
    event_type: &str,
    payload: &serde_json::Value,
    actor: &Requester,
    location: Option<GeoPoint>,
    correlation_id: &CorrelationId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query(
        r#"
            INSERT INTO order_events (
                order_pk, event_type, payload, actor_id, actor_type, latitude, longitude, correlation_id, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(order_pk)
    .bind(event_type)
    .bind(payload.to_string())
    .bind(&actor.user_id)
    .bind(actor.role)
    .bind(location.map(|l| l.latitude))
    .bind(location.map(|l| l.longitude))
    .bind(correlation_id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// The ledger for one order, newest entries first.
pub async fn fetch_events(
    order_pk: i64,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderEvent>, SqliteDatabaseError> {
    let events = sqlx::query_as::<_, OrderEvent>(
        r#"
            SELECT id, order_pk, event_type, payload, actor_id, actor_type, latitude, longitude,
                   correlation_id, created_at
            FROM order_events WHERE order_pk = $1 ORDER BY id DESC LIMIT $2
        "#,
    )
    .bind(order_pk)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(events)
}
