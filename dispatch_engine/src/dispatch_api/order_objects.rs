use chrono::{DateTime, Utc};
use pd_common::MoneyCents;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{
        AssignmentStatus,
        NewItem,
        NewStop,
        Order,
        OrderEvent,
        OrderId,
        OrderStatus,
        PorterId,
        StopStatus,
        VehicleType,
    },
    dispatch_api::OrderFlowError,
    helpers::geo::GeoPoint,
};

//--------------------------------------   OrderQueryFilter    -------------------------------------------------------
/// Builder-style filter for the `list` operation. Filter fields narrow the match set; `limit`/`offset`/`newest_first`
/// only shape the returned page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub customer_id: Option<String>,
    pub porter_id: Option<PorterId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<OrderStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(default)]
    pub newest_first: bool,
}

impl OrderQueryFilter {
    /// True when no filter fields are set. Pagination fields do not count.
    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none() &&
            self.porter_id.is_none() &&
            self.statuses.is_empty() &&
            self.since.is_none() &&
            self.until.is_none()
    }

    pub fn with_customer_id<S: Into<String>>(mut self, customer_id: S) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_porter_id(mut self, porter_id: PorterId) -> Self {
        self.porter_id = Some(porter_id);
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }
}

//--------------------------------------     Create order      -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub stops: Vec<NewStop>,
    pub items: Vec<NewItem>,
    pub vehicle: VehicleType,
    pub porters_requested: i64,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub instructions: Option<String>,
}

impl CreateOrderRequest {
    pub fn validate(&self) -> Result<(), OrderFlowError> {
        if self.customer_id.trim().is_empty() {
            return Err(OrderFlowError::Validation("customer_id must not be empty".into()));
        }
        if self.stops.len() < 2 {
            return Err(OrderFlowError::Validation("An order needs at least a pickup and a dropoff stop".into()));
        }
        if self.items.is_empty() {
            return Err(OrderFlowError::Validation("An order needs at least one item".into()));
        }
        if self.porters_requested < 1 {
            return Err(OrderFlowError::Validation("porters_requested must be at least 1".into()));
        }
        let mut sequences = self.stops.iter().map(|s| s.sequence).collect::<Vec<_>>();
        sequences.sort_unstable();
        sequences.dedup();
        if sequences.len() != self.stops.len() {
            return Err(OrderFlowError::Validation("Stop sequence numbers must be unique".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderResult {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub price: MoneyCents,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------     Update order      -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrderResult {
    pub order_id: OrderId,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       Cancel          -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResult {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub fee: MoneyCents,
    pub refund: MoneyCents,
    pub cancelled_at: DateTime<Utc>,
}

//--------------------------------------     Change status     -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeStatusRequest {
    pub new_status: OrderStatus,
    pub location: Option<GeoPoint>,
    /// The version the caller read. When present, a conflicting write fails immediately with the concurrency error;
    /// when absent, the engine re-reads and retries a bounded number of times.
    pub expected_version: Option<i64>,
}

impl ChangeStatusRequest {
    pub fn to(new_status: OrderStatus) -> Self {
        Self { new_status, location: None, expected_version: None }
    }

    pub fn at(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }

    pub fn expecting_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeStatusResult {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub version: i64,
    /// The most recent ledger entries for the order, newest first.
    pub timeline: Vec<OrderEvent>,
}

//--------------------------------------    Assign porters     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStrategy {
    Direct,
    Offer,
    Bidding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignPortersRequest {
    pub strategy: AssignmentStrategy,
    pub porter_ids: Vec<PorterId>,
    /// For `direct` only: create accepted assignments immediately instead of tentative ones.
    #[serde(default)]
    pub auto_assign: bool,
    pub offer_expiry_minutes: Option<i64>,
    pub earnings: Option<MoneyCents>,
}

impl AssignPortersRequest {
    pub fn direct(porter_ids: Vec<PorterId>, auto_assign: bool) -> Self {
        Self { strategy: AssignmentStrategy::Direct, porter_ids, auto_assign, offer_expiry_minutes: None, earnings: None }
    }

    pub fn offer(porter_ids: Vec<PorterId>, offer_expiry_minutes: i64) -> Self {
        Self {
            strategy: AssignmentStrategy::Offer,
            porter_ids,
            auto_assign: false,
            offer_expiry_minutes: Some(offer_expiry_minutes),
            earnings: None,
        }
    }

    pub fn bidding(candidates: Vec<PorterId>, offer_expiry_minutes: i64) -> Self {
        Self {
            strategy: AssignmentStrategy::Bidding,
            porter_ids: candidates,
            auto_assign: false,
            offer_expiry_minutes: Some(offer_expiry_minutes),
            earnings: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentState {
    pub porter_id: PorterId,
    pub status: AssignmentStatus,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignPortersResult {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub assignments: Vec<AssignmentState>,
}

//--------------------------------------   Accept / reject     -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptOfferResult {
    pub order_id: OrderId,
    pub porter_id: PorterId,
    pub status: AssignmentStatus,
    pub accepted_at: Option<DateTime<Utc>>,
    /// The porters whose open offers were revoked by this acceptance.
    pub revoked: Vec<PorterId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectOfferResult {
    pub order_id: OrderId,
    pub porter_id: PorterId,
    pub status: AssignmentStatus,
}

//--------------------------------------      Waypoints        -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaypointResult {
    pub order_id: OrderId,
    pub stop_id: i64,
    pub status: StopStatus,
    pub arrived_at: Option<DateTime<Utc>>,
    pub departed_at: Option<DateTime<Utc>>,
}

//--------------------------------------      Evidence         -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceResult {
    pub order_id: OrderId,
    pub evidence_id: i64,
    pub uploaded_at: DateTime<Utc>,
}

//--------------------------------------    Admin override     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    ForceComplete,
    ForceCancel,
    Reassign,
    ResolveDispute,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminOverrideRequest {
    pub action: AdminAction,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminOverrideResult {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub message: String,
}

//--------------------------------------       Listing         -------------------------------------------------------
/// One page of matching orders plus the total match count before pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: i64,
}
