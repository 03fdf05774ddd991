use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{NewStop, OrderStop, StopStatus},
};

const STOP_COLUMNS: &str = r#"
    id, order_pk, sequence, stop_type, status, address, latitude, longitude, contact_name, contact_phone,
    arrived_at, departed_at, created_at, updated_at
"#;

pub async fn insert_stops(
    order_pk: i64,
    stops: &[NewStop],
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    for stop in stops {
        sqlx::query(
            r#"
                INSERT INTO order_stops (
                    order_pk, sequence, stop_type, status, address, latitude, longitude,
                    contact_name, contact_phone, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order_pk)
        .bind(stop.sequence)
        .bind(stop.stop_type)
        .bind(StopStatus::Pending)
        .bind(&stop.address)
        .bind(stop.latitude)
        .bind(stop.longitude)
        .bind(&stop.contact_name)
        .bind(&stop.contact_phone)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// All stops for an order, in route order.
pub async fn fetch_stops(order_pk: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderStop>, SqliteDatabaseError> {
    let sql = format!("SELECT {STOP_COLUMNS} FROM order_stops WHERE order_pk = $1 ORDER BY sequence ASC");
    let stops = sqlx::query_as::<_, OrderStop>(&sql).bind(order_pk).fetch_all(conn).await?;
    Ok(stops)
}

pub async fn fetch_stop(
    order_pk: i64,
    stop_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderStop>, SqliteDatabaseError> {
    let sql = format!("SELECT {STOP_COLUMNS} FROM order_stops WHERE order_pk = $1 AND id = $2");
    let stop = sqlx::query_as::<_, OrderStop>(&sql).bind(order_pk).bind(stop_id).fetch_optional(conn).await?;
    Ok(stop)
}

/// Moves a stop to `new_status`, stamping the matching timestamp: arrival for `Arrived`, departure for
/// `Completed`, neither for `Skipped`.
pub(crate) async fn set_stop_status(
    stop_id: i64,
    new_status: StopStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let sql = match new_status {
        StopStatus::Arrived => "UPDATE order_stops SET status = $1, arrived_at = $2, updated_at = $2 WHERE id = $3",
        StopStatus::Completed => "UPDATE order_stops SET status = $1, departed_at = $2, updated_at = $2 WHERE id = $3",
        _ => "UPDATE order_stops SET status = $1, updated_at = $2 WHERE id = $3",
    };
    sqlx::query(sql).bind(new_status).bind(now).bind(stop_id).execute(conn).await?;
    Ok(())
}
