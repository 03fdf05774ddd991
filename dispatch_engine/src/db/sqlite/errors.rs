use thiserror::Error;

use crate::db_types::{OrderId, PorterId};

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(sqlx::Error),
    #[error("The database is locked by another writer. The operation can be retried.")]
    Busy,
    #[error("Database query error: {0}")]
    QueryError(String),
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),
    #[error("Order {order_id} has no stop with id {stop_id}")]
    StopNotFound { order_id: OrderId, stop_id: i64 },
    #[error("Order {order_id} has no assignment for porter {porter_id}")]
    AssignmentNotFound { order_id: OrderId, porter_id: PorterId },
    #[error("Cannot process duplicate order {0}")]
    DuplicateOrder(OrderId),
    #[error("Porter {porter_id} already has an assignment on order {order_id}")]
    DuplicateOffer { order_id: OrderId, porter_id: PorterId },
    #[error("Order {0} was modified by another writer. Re-read and try again.")]
    VersionConflict(OrderId),
    #[error("The offer on order {order_id} to porter {porter_id} has expired")]
    OfferExpired { order_id: OrderId, porter_id: PorterId },
    #[error("Order {order_id} has already been accepted by porter {accepted_by}")]
    OfferAlreadyAccepted { order_id: OrderId, accepted_by: PorterId },
}

// SQLITE_BUSY, SQLITE_LOCKED and their extended recovery/snapshot codes.
const BUSY_CODES: [&str; 4] = ["5", "6", "261", "517"];

impl From<sqlx::Error> for SqliteDatabaseError {
    fn from(e: sqlx::Error) -> Self {
        // Lock contention between concurrent writers is transient; callers re-read and retry rather than treating
        // it as an infrastructure failure.
        if let sqlx::Error::Database(db) = &e {
            let busy_code = db.code().map(|c| BUSY_CODES.contains(&c.as_ref())).unwrap_or(false);
            if busy_code || db.message().contains("database is locked") {
                return Self::Busy;
            }
        }
        Self::DriverError(e)
    }
}
