use thiserror::Error;

#[cfg(feature = "sqlite")]
use crate::db::sqlite::SqliteDatabaseError;
use crate::{
    db_types::{OrderId, OrderStatus, PorterId},
    transitions::TransitionError,
};

/// The business-error taxonomy for the public operations. Domain errors are raised at the point of violation and
/// cross this boundary untranslated; mapping to transport codes (404/403/409…) is the caller's job.
#[derive(Debug, Error)]
pub enum OrderFlowError {
    #[error("The requested order {0} does not exist")]
    NotFound(OrderId),
    #[error("Order {order_id} has no assignment for porter {porter_id}")]
    AssignmentNotFound { order_id: OrderId, porter_id: PorterId },
    #[error("Order {order_id} has no stop with id {stop_id}")]
    StopNotFound { order_id: OrderId, stop_id: i64 },
    #[error("{0} does not have access to this order")]
    Forbidden(String),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    InvalidStatusTransition(#[from] TransitionError),
    #[error("Order {order_id} can no longer be edited (status is {status})")]
    UpdateNotAllowed { order_id: OrderId, status: OrderStatus },
    #[error("Order {0} has already been cancelled")]
    AlreadyCancelled(OrderId),
    #[error("Order {0} has already been completed")]
    AlreadyCompleted(OrderId),
    #[error("The offer on order {order_id} to porter {porter_id} has expired")]
    OfferExpired { order_id: OrderId, porter_id: PorterId },
    #[error("Order {order_id} has already been accepted by porter {accepted_by}")]
    OfferAlreadyAccepted { order_id: OrderId, accepted_by: PorterId },
    #[error("Order {0} was modified by another writer. Re-read and try again.")]
    Concurrency(OrderId),
    #[error("The dispatch store is busy. The operation can be retried.")]
    Contention,
    #[error("The {service} service call failed: {message}")]
    Upstream { service: &'static str, message: String },
    #[error("{0} is not supported yet")]
    Unsupported(String),
    /// The stored failure of an earlier execution, returned verbatim for a replayed idempotency key.
    #[error("{message}")]
    ReplayedFailure { code: String, message: String },
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl OrderFlowError {
    /// A stable code for each variant, used when persisting an outcome for idempotent replay.
    pub fn code(&self) -> &str {
        use OrderFlowError::*;
        match self {
            NotFound(_) => "not_found",
            AssignmentNotFound { .. } => "assignment_not_found",
            StopNotFound { .. } => "stop_not_found",
            Forbidden(_) => "forbidden",
            Validation(_) => "validation",
            InvalidStatusTransition(_) => "invalid_status_transition",
            UpdateNotAllowed { .. } => "update_not_allowed",
            AlreadyCancelled(_) => "already_cancelled",
            AlreadyCompleted(_) => "already_completed",
            OfferExpired { .. } => "offer_expired",
            OfferAlreadyAccepted { .. } => "offer_already_accepted",
            Concurrency(_) => "concurrency",
            Contention => "contention",
            Upstream { .. } => "upstream",
            Unsupported(_) => "unsupported",
            ReplayedFailure { code, .. } => code,
            DatabaseError(_) => "database",
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<SqliteDatabaseError> for OrderFlowError {
    fn from(e: SqliteDatabaseError) -> Self {
        match e {
            SqliteDatabaseError::OrderNotFound(oid) => OrderFlowError::NotFound(oid),
            SqliteDatabaseError::StopNotFound { order_id, stop_id } => {
                OrderFlowError::StopNotFound { order_id, stop_id }
            },
            SqliteDatabaseError::AssignmentNotFound { order_id, porter_id } => {
                OrderFlowError::AssignmentNotFound { order_id, porter_id }
            },
            SqliteDatabaseError::DuplicateOrder(oid) => {
                OrderFlowError::Validation(format!("Order {oid} already exists"))
            },
            SqliteDatabaseError::DuplicateOffer { order_id, porter_id } => {
                OrderFlowError::Validation(format!("Porter {porter_id} already has an offer on order {order_id}"))
            },
            SqliteDatabaseError::VersionConflict(oid) => OrderFlowError::Concurrency(oid),
            SqliteDatabaseError::OfferExpired { order_id, porter_id } => {
                OrderFlowError::OfferExpired { order_id, porter_id }
            },
            SqliteDatabaseError::OfferAlreadyAccepted { order_id, accepted_by } => {
                OrderFlowError::OfferAlreadyAccepted { order_id, accepted_by }
            },
            SqliteDatabaseError::Busy => OrderFlowError::Contention,
            SqliteDatabaseError::DriverError(e) => OrderFlowError::DatabaseError(e.to_string()),
            SqliteDatabaseError::QueryError(msg) => OrderFlowError::DatabaseError(msg),
        }
    }
}
