use chrono::{DateTime, Utc};

use crate::{
    db::traits::{DispatchStats, OrderDetail},
    db_types::{Order, OrderAssignment, OrderEvent, OrderId, PorterId},
    dispatch_api::order_objects::OrderQueryFilter,
};

/// The read-side contract: queries never mutate and never require a version.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    type Error: std::error::Error;

    async fn order_by_id(&self, oid: &OrderId) -> Result<Option<Order>, Self::Error>;

    async fn order_detail(&self, oid: &OrderId) -> Result<Option<OrderDetail>, Self::Error>;

    /// Returns the matching page of orders and the total match count before pagination.
    async fn search_orders(&self, filter: OrderQueryFilter) -> Result<(Vec<Order>, i64), Self::Error>;

    async fn assignment(&self, oid: &OrderId, porter_id: &PorterId) -> Result<Option<OrderAssignment>, Self::Error>;

    /// The audit ledger for an order, newest entries first.
    async fn audit_trail(&self, oid: &OrderId, limit: i64) -> Result<Vec<OrderEvent>, Self::Error>;

    async fn statistics(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<DispatchStats, Self::Error>;
}
