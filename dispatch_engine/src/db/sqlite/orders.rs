use chrono::{DateTime, Utc};
use log::{debug, trace};
use pd_common::MoneyCents;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{NewOrder, Order, OrderId, OrderStatus, OrderUpdate},
    dispatch_api::order_objects::OrderQueryFilter,
};

/// Inserts a new order row. This is not atomic on its own. Embed the call inside a transaction and pass `&mut *tx`
/// as the connection argument to get atomicity with the stops, items and ledger rows.
pub async fn insert_order(
    order: &NewOrder,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, SqliteDatabaseError> {
    if fetch_order(&order.order_id, &mut *conn).await?.is_some() {
        return Err(SqliteDatabaseError::DuplicateOrder(order.order_id.clone()));
    }
    sqlx::query(
        r#"
            INSERT INTO orders (
                order_id, customer_id, status, price, currency, porters_requested, vehicle,
                scheduled_at, instructions, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(&order.order_id)
    .bind(&order.customer_id)
    .bind(OrderStatus::Created)
    .bind(order.price)
    .bind(&order.currency)
    .bind(order.porters_requested)
    .bind(order.vehicle)
    .bind(order.scheduled_at)
    .bind(&order.instructions)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    let inserted = fetch_order(&order.order_id, conn)
        .await?
        .ok_or_else(|| SqliteDatabaseError::QueryError(format!("Order {} vanished after insert", order.order_id)))?;
    debug!("🗃️ Order {} has been saved in the DB with id {}", order.order_id, inserted.id);
    Ok(inserted)
}

const ORDER_COLUMNS: &str = r#"
    id, order_id, customer_id, status, price, currency, porters_requested, porters_assigned, vehicle,
    scheduled_at, instructions, version, cancelled_at, cancelled_by, cancel_reason, cancellation_fee,
    disputed, created_at, updated_at
"#;

pub async fn fetch_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1");
    let order = sqlx::query_as::<_, Order>(&sql).bind(order_id).fetch_optional(conn).await?;
    Ok(order)
}

fn push_filters(builder: &mut QueryBuilder<'_, sqlx::Sqlite>, filter: &OrderQueryFilter) {
    if filter.is_empty() {
        return;
    }
    builder.push(" WHERE ");
    let mut where_clause = builder.separated(" AND ");
    if let Some(customer_id) = &filter.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(customer_id.clone());
    }
    if let Some(porter_id) = &filter.porter_id {
        where_clause.push("id IN (SELECT order_pk FROM order_assignments WHERE porter_id = ");
        where_clause.push_bind_unseparated(porter_id.clone());
        where_clause.push_unseparated(")");
    }
    if !filter.statuses.is_empty() {
        let statuses = filter.statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
        where_clause.push(format!("status IN ({statuses})"));
    }
    if let Some(since) = filter.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = filter.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
}

/// Fetches the page of orders matching the filter, plus the total match count before pagination.
pub async fn search_orders(
    filter: &OrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<(Vec<Order>, i64), SqliteDatabaseError> {
    let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM orders");
    push_filters(&mut count_builder, filter);
    let total: i64 = count_builder.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut builder = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders"));
    push_filters(&mut builder, filter);
    builder.push(if filter.newest_first { " ORDER BY created_at DESC" } else { " ORDER BY created_at ASC" });
    builder.push(" LIMIT ");
    builder.push_bind(filter.limit.unwrap_or(50));
    builder.push(" OFFSET ");
    builder.push_bind(filter.offset.unwrap_or(0));

    trace!("📋️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("📋️ search_orders matched {total} rows, returning {}", orders.len());
    Ok((orders, total))
}

/// Applies an [`OrderUpdate`] conditioned on the version the caller read. Returns `false` when another writer got
/// there first.
pub(crate) async fn update_fields_with_version(
    order_pk: i64,
    expected_version: i64,
    update: &OrderUpdate,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    if update.is_empty() {
        debug!("🗃️ No fields to update for order pk {order_pk}. Update request skipped.");
        return Ok(true);
    }
    let mut builder = QueryBuilder::new("UPDATE orders SET version = version + 1, updated_at = ");
    builder.push_bind(now);
    builder.push(", ");
    let mut set_clause = builder.separated(", ");
    if let Some(instructions) = &update.instructions {
        set_clause.push("instructions = ");
        set_clause.push_bind_unseparated(instructions.clone());
    }
    if let Some(scheduled_at) = update.scheduled_at {
        set_clause.push("scheduled_at = ");
        set_clause.push_bind_unseparated(scheduled_at);
    }
    if let Some(vehicle) = update.vehicle {
        set_clause.push("vehicle = ");
        set_clause.push_bind_unseparated(vehicle);
    }
    if let Some(porters_requested) = update.porters_requested {
        set_clause.push("porters_requested = ");
        set_clause.push_bind_unseparated(porters_requested);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(order_pk);
    builder.push(" AND version = ");
    builder.push_bind(expected_version);
    let res = builder.build().execute(conn).await?;
    Ok(res.rows_affected() > 0)
}

pub(crate) async fn set_status_with_version(
    order_pk: i64,
    expected_version: i64,
    new_status: OrderStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let res = sqlx::query(
        "UPDATE orders SET status = $1, version = version + 1, updated_at = $2 WHERE id = $3 AND version = $4",
    )
    .bind(new_status)
    .bind(now)
    .bind(order_pk)
    .bind(expected_version)
    .execute(conn)
    .await?;
    Ok(res.rows_affected() > 0)
}

pub(crate) async fn set_cancelled_with_version(
    order_pk: i64,
    expected_version: i64,
    cancelled_by: &str,
    reason: &str,
    fee: MoneyCents,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let res = sqlx::query(
        r#"
            UPDATE orders
            SET status = $1, cancelled_at = $2, cancelled_by = $3, cancel_reason = $4, cancellation_fee = $5,
                version = version + 1, updated_at = $2
            WHERE id = $6 AND version = $7
        "#,
    )
    .bind(OrderStatus::Cancelled)
    .bind(now)
    .bind(cancelled_by)
    .bind(reason)
    .bind(fee)
    .bind(order_pk)
    .bind(expected_version)
    .execute(conn)
    .await?;
    Ok(res.rows_affected() > 0)
}

pub(crate) async fn set_dispute_with_version(
    order_pk: i64,
    expected_version: i64,
    disputed: bool,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let res = sqlx::query(
        "UPDATE orders SET disputed = $1, version = version + 1, updated_at = $2 WHERE id = $3 AND version = $4",
    )
    .bind(disputed)
    .bind(now)
    .bind(order_pk)
    .bind(expected_version)
    .execute(conn)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// The winning-acceptance write: status, assigned-porter count and version move together. Runs inside the accept
/// transaction, which is serialized by the store, so no version condition is needed here.
pub(crate) async fn mark_accepted(
    order_pk: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query(
        r#"
            UPDATE orders
            SET status = $1, porters_assigned = porters_assigned + 1, version = version + 1, updated_at = $2
            WHERE id = $3
        "#,
    )
    .bind(OrderStatus::Accepted)
    .bind(now)
    .bind(order_pk)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn set_porters_assigned(
    order_pk: i64,
    count: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE orders SET porters_assigned = $1, updated_at = $2 WHERE id = $3")
        .bind(count)
        .bind(now)
        .bind(order_pk)
        .execute(conn)
        .await?;
    Ok(())
}

/// Bumps the optimistic-lock version without changing any other field. Used by flows that mutate satellite rows
/// (waypoints) so their events still carry a fresh order version.
pub(crate) async fn bump_version(
    order_pk: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE orders SET version = version + 1, updated_at = $1 WHERE id = $2")
        .bind(now)
        .bind(order_pk)
        .execute(conn)
        .await?;
    Ok(())
}
