use chrono::{DateTime, Utc};
use pd_common::MoneyCents;
use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{AssignmentStatus, OrderAssignment, OrderId, PorterId},
};

const ASSIGNMENT_COLUMNS: &str = r#"
    id, order_pk, porter_id, status, offered_at, expires_at, accepted_at, rejected_at, revoked_at,
    reject_reason, earnings, created_at, updated_at
"#;

/// Creates one assignment row. The (order, porter) uniqueness constraint turns a repeated offer to the same porter
/// into [`SqliteDatabaseError::DuplicateOffer`].
#[allow(clippy::too_many_arguments)]
pub async fn insert_assignment(
    order_pk: i64,
    order_id: &OrderId,
    porter_id: &PorterId,
    status: AssignmentStatus,
    expires_at: Option<DateTime<Utc>>,
    earnings: Option<MoneyCents>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<OrderAssignment, SqliteDatabaseError> {
    let accepted_at = (status == AssignmentStatus::Accepted).then_some(now);
    let res = sqlx::query(
        r#"
            INSERT INTO order_assignments (
                order_pk, porter_id, status, offered_at, expires_at, accepted_at, earnings, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(order_pk)
    .bind(porter_id)
    .bind(status)
    .bind(now)
    .bind(expires_at)
    .bind(accepted_at)
    .bind(earnings)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await;
    match res {
        Ok(_) => {},
        Err(sqlx::Error::Database(e)) if e.kind() == sqlx::error::ErrorKind::UniqueViolation => {
            return Err(SqliteDatabaseError::DuplicateOffer {
                order_id: order_id.clone(),
                porter_id: porter_id.clone(),
            })
        },
        Err(e) => return Err(e.into()),
    }
    fetch_assignment(order_pk, porter_id, conn).await?.ok_or_else(|| {
        SqliteDatabaseError::QueryError(format!("Assignment for {porter_id} on order {order_id} vanished after insert"))
    })
}

pub async fn fetch_assignment(
    order_pk: i64,
    porter_id: &PorterId,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderAssignment>, SqliteDatabaseError> {
    let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM order_assignments WHERE order_pk = $1 AND porter_id = $2");
    let assignment =
        sqlx::query_as::<_, OrderAssignment>(&sql).bind(order_pk).bind(porter_id).fetch_optional(conn).await?;
    Ok(assignment)
}

pub async fn fetch_assignments(
    order_pk: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderAssignment>, SqliteDatabaseError> {
    let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM order_assignments WHERE order_pk = $1 ORDER BY id ASC");
    let assignments = sqlx::query_as::<_, OrderAssignment>(&sql).bind(order_pk).fetch_all(conn).await?;
    Ok(assignments)
}

/// The porter currently holding the accepted assignment for this order, if any.
pub async fn accepted_porter(
    order_pk: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PorterId>, SqliteDatabaseError> {
    let porter = sqlx::query_scalar::<_, String>(
        "SELECT porter_id FROM order_assignments WHERE order_pk = $1 AND status = $2 LIMIT 1",
    )
    .bind(order_pk)
    .bind(AssignmentStatus::Accepted)
    .fetch_optional(conn)
    .await?;
    Ok(porter.map(PorterId::from))
}

pub(crate) async fn mark_accepted(
    assignment_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE order_assignments SET status = $1, accepted_at = $2, updated_at = $2 WHERE id = $3")
        .bind(AssignmentStatus::Accepted)
        .bind(now)
        .bind(assignment_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn mark_rejected(
    assignment_id: i64,
    reason: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query(
        "UPDATE order_assignments SET status = $1, rejected_at = $2, reject_reason = $3, updated_at = $2 WHERE id = $4",
    )
    .bind(AssignmentStatus::Rejected)
    .bind(now)
    .bind(reason)
    .bind(assignment_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn mark_expired(
    assignment_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE order_assignments SET status = $1, updated_at = $2 WHERE id = $3")
        .bind(AssignmentStatus::Expired)
        .bind(now)
        .bind(assignment_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Revokes every still-open offer on the order except the winner's. Returns the porters whose offers were pulled.
pub(crate) async fn revoke_other_offers(
    order_pk: i64,
    winner: &PorterId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<PorterId>, SqliteDatabaseError> {
    let losers = sqlx::query_scalar::<_, String>(
        "SELECT porter_id FROM order_assignments WHERE order_pk = $1 AND status = $2 AND porter_id != $3",
    )
    .bind(order_pk)
    .bind(AssignmentStatus::Offered)
    .bind(winner)
    .fetch_all(&mut *conn)
    .await?;
    if losers.is_empty() {
        return Ok(Vec::new());
    }
    sqlx::query(
        r#"
            UPDATE order_assignments SET status = $1, revoked_at = $2, updated_at = $2
            WHERE order_pk = $3 AND status = $4 AND porter_id != $5
        "#,
    )
    .bind(AssignmentStatus::Revoked)
    .bind(now)
    .bind(order_pk)
    .bind(AssignmentStatus::Offered)
    .bind(winner)
    .execute(conn)
    .await?;
    Ok(losers.into_iter().map(PorterId::from).collect())
}
