use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use pd_common::MoneyCents;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {0}: {1}")]
pub struct ConversionError(&'static str, String);

fn random_suffix() -> String {
    let n: u64 = rand::random();
    format!("{n:016x}")
}

//--------------------------------------        OrderId        -------------------------------------------------------
/// The public identifier of an order. Generated by the engine at creation time and used by every client-facing
/// operation. The storage layer keeps a separate integer primary key.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn random() -> Self {
        Self(format!("ord-{}", random_suffix()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------        PorterId       -------------------------------------------------------
/// A lightweight wrapper around the identifier of a porter (mobile worker).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct PorterId(pub String);

impl Display for PorterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for PorterId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

//--------------------------------------     CorrelationId     -------------------------------------------------------
/// An opaque token threading one logical operation across audit records and published events.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn random() -> Self {
        Self(format!("corr-{}", random_suffix()))
    }
}

impl<S: Into<String>> From<S> for CorrelationId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------      OrderStatus      -------------------------------------------------------
/// The lifecycle state of an order. The allowed transitions between these states are defined in
/// [`crate::transitions`] and enforced by the orchestration layer. `Closed`, `Cancelled` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Newly created. No porters have been approached yet.
    Created,
    /// Offers are out to one or more porters, none has accepted yet.
    TentativelyAssigned,
    /// Porters have been attached to the order by direct assignment.
    Assigned,
    /// A porter has committed to the job.
    Accepted,
    /// The porter has arrived at the first pickup stop.
    Arrived,
    /// The goods are on the vehicle.
    Loaded,
    /// The vehicle is moving towards the dropoff.
    EnRoute,
    /// The goods have been handed over at the dropoff.
    Delivered,
    /// All stops are done and the job is finished from the porter's side.
    Completed,
    /// The order has been settled and archived.
    Closed,
    /// The order was cancelled by the customer or an admin.
    Cancelled,
    /// The order could not be carried out.
    Failed,
}

pub const ALL_ORDER_STATUSES: [OrderStatus; 12] = [
    OrderStatus::Created,
    OrderStatus::TentativelyAssigned,
    OrderStatus::Assigned,
    OrderStatus::Accepted,
    OrderStatus::Arrived,
    OrderStatus::Loaded,
    OrderStatus::EnRoute,
    OrderStatus::Delivered,
    OrderStatus::Completed,
    OrderStatus::Closed,
    OrderStatus::Cancelled,
    OrderStatus::Failed,
];

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::TentativelyAssigned => "TENTATIVELY_ASSIGNED",
            OrderStatus::Assigned => "ASSIGNED",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::Arrived => "ARRIVED",
            OrderStatus::Loaded => "LOADED",
            OrderStatus::EnRoute => "EN_ROUTE",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Closed => "CLOSED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Failed => "FAILED",
        }
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_ORDER_STATUSES
            .iter()
            .find(|v| v.as_str() == s)
            .copied()
            .ok_or_else(|| ConversionError("order status", s.to_string()))
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Created");
            OrderStatus::Created
        })
    }
}

//--------------------------------------     VehicleType       -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Motorbike,
    Car,
    Van,
    Truck,
}

impl Display for VehicleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VehicleType::Motorbike => "motorbike",
            VehicleType::Car => "car",
            VehicleType::Van => "van",
            VehicleType::Truck => "truck",
        };
        f.write_str(s)
    }
}

impl FromStr for VehicleType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "motorbike" => Ok(Self::Motorbike),
            "car" => Ok(Self::Car),
            "van" => Ok(Self::Van),
            "truck" => Ok(Self::Truck),
            other => Err(ConversionError("vehicle type", other.to_string())),
        }
    }
}

//--------------------------------------      ActorType        -------------------------------------------------------
/// Who performed an action. Supplied by the auth middleware upstream of this engine and trusted unconditionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    Customer,
    Porter,
    Admin,
    System,
}

impl Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActorType::Customer => "customer",
            ActorType::Porter => "porter",
            ActorType::Admin => "admin",
            ActorType::System => "system",
        };
        f.write_str(s)
    }
}

/// A verified actor identity, as handed to the engine by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: String,
    pub role: ActorType,
}

impl Requester {
    pub fn new<S: Into<String>>(user_id: S, role: ActorType) -> Self {
        Self { user_id: user_id.into(), role }
    }

    pub fn customer<S: Into<String>>(user_id: S) -> Self {
        Self::new(user_id, ActorType::Customer)
    }

    pub fn porter<S: Into<String>>(user_id: S) -> Self {
        Self::new(user_id, ActorType::Porter)
    }

    pub fn admin<S: Into<String>>(user_id: S) -> Self {
        Self::new(user_id, ActorType::Admin)
    }

    pub fn system() -> Self {
        Self::new("system", ActorType::System)
    }
}

//--------------------------------------        Order          -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub customer_id: String,
    pub status: OrderStatus,
    pub price: MoneyCents,
    pub currency: String,
    pub porters_requested: i64,
    pub porters_assigned: i64,
    pub vehicle: VehicleType,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub instructions: Option<String>,
    /// Monotonically increasing optimistic-lock counter. Every committed mutation bumps it by one.
    pub version: i64,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
    pub cancel_reason: Option<String>,
    pub cancellation_fee: Option<MoneyCents>,
    pub disputed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, OrderStatus::Closed | OrderStatus::Cancelled | OrderStatus::Failed)
    }
}

//--------------------------------------       NewOrder        -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub customer_id: String,
    pub price: MoneyCents,
    pub currency: String,
    pub porters_requested: i64,
    pub vehicle: VehicleType,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub instructions: Option<String>,
}

impl NewOrder {
    pub fn new<S: Into<String>>(customer_id: S, price: MoneyCents, vehicle: VehicleType) -> Self {
        Self {
            order_id: OrderId::random(),
            customer_id: customer_id.into(),
            price,
            currency: pd_common::DEFAULT_CURRENCY_CODE.to_string(),
            porters_requested: 1,
            vehicle,
            scheduled_at: None,
            instructions: None,
        }
    }

    pub fn with_porters(mut self, count: i64) -> Self {
        self.porters_requested = count;
        self
    }

    pub fn with_instructions<S: Into<String>>(mut self, instructions: S) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

//--------------------------------------      StopType         -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StopType {
    Pickup,
    Dropoff,
}

impl Display for StopType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopType::Pickup => f.write_str("pickup"),
            StopType::Dropoff => f.write_str("dropoff"),
        }
    }
}

//--------------------------------------      StopStatus       -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopStatus {
    Pending,
    Arrived,
    Completed,
    Skipped,
}

impl Display for StopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopStatus::Pending => "PENDING",
            StopStatus::Arrived => "ARRIVED",
            StopStatus::Completed => "COMPLETED",
            StopStatus::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

//--------------------------------------      OrderStop        -------------------------------------------------------
/// A waypoint on an order's route. Stops are ordered by `sequence`, which is unique per order.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderStop {
    pub id: i64,
    pub order_pk: i64,
    pub sequence: i64,
    pub stop_type: StopType,
    pub status: StopStatus,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub arrived_at: Option<DateTime<Utc>>,
    pub departed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStop {
    pub sequence: i64,
    pub stop_type: StopType,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
}

impl NewStop {
    pub fn new<S: Into<String>>(sequence: i64, stop_type: StopType, address: S, latitude: f64, longitude: f64) -> Self {
        Self {
            sequence,
            stop_type,
            address: address.into(),
            latitude,
            longitude,
            contact_name: None,
            contact_phone: None,
        }
    }
}

//--------------------------------------      OrderItem        -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_pk: i64,
    pub description: String,
    pub quantity: i64,
    pub weight_grams: i64,
    pub length_cm: i64,
    pub width_cm: i64,
    pub height_cm: i64,
    pub fragile: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItem {
    pub description: String,
    pub quantity: i64,
    pub weight_grams: i64,
    pub length_cm: i64,
    pub width_cm: i64,
    pub height_cm: i64,
    pub fragile: bool,
}

impl NewItem {
    pub fn new<S: Into<String>>(description: S, weight_grams: i64) -> Self {
        Self {
            description: description.into(),
            quantity: 1,
            weight_grams,
            length_cm: 0,
            width_cm: 0,
            height_cm: 0,
            fragile: false,
        }
    }
}

//--------------------------------------   AssignmentStatus    -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Offered,
    Tentative,
    Accepted,
    Rejected,
    Revoked,
    Expired,
}

impl Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AssignmentStatus::Offered => "OFFERED",
            AssignmentStatus::Tentative => "TENTATIVE",
            AssignmentStatus::Accepted => "ACCEPTED",
            AssignmentStatus::Rejected => "REJECTED",
            AssignmentStatus::Revoked => "REVOKED",
            AssignmentStatus::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

//--------------------------------------    OrderAssignment    -------------------------------------------------------
/// The relationship between one order and one porter. At most one row per (order, porter) pair; the offer and
/// acceptance lifecycle lives here rather than on the order itself.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderAssignment {
    pub id: i64,
    pub order_pk: i64,
    pub porter_id: PorterId,
    pub status: AssignmentStatus,
    pub offered_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub reject_reason: Option<String>,
    pub earnings: Option<MoneyCents>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      OrderEvent       -------------------------------------------------------
/// One immutable row in the audit ledger. Written in the same transaction as the state change it records, and never
/// updated or deleted afterwards.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderEvent {
    pub id: i64,
    pub order_pk: i64,
    pub event_type: String,
    /// JSON document with the previous/new values for the change.
    pub payload: String,
    pub actor_id: String,
    pub actor_type: ActorType,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub correlation_id: CorrelationId,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------       Evidence        -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Evidence {
    pub id: i64,
    pub order_pk: i64,
    pub evidence_type: String,
    pub url: String,
    pub checksum: Option<String>,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvidence {
    pub evidence_type: String,
    pub url: String,
    pub checksum: Option<String>,
    pub uploaded_by: String,
}

//--------------------------------------  IdempotencyRecord    -------------------------------------------------------
/// The stored outcome of a mutating call, keyed by the caller-supplied idempotency key. Read-only after creation
/// until it expires.
#[derive(Debug, Clone, FromRow)]
pub struct IdempotencyRecord {
    pub key: String,
    /// JSON-serialized [`crate::dispatch_api::StoredOutcome`].
    pub outcome: String,
    /// Blake2 hash of the original request body. Stored for diagnostics; not currently compared on replay.
    pub input_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

//--------------------------------------      OrderUpdate      -------------------------------------------------------
/// The set of order fields a customer may change while the order is still editable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub instructions: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub vehicle: Option<VehicleType>,
    pub porters_requested: Option<i64>,
}

impl OrderUpdate {
    pub fn is_empty(&self) -> bool {
        self.instructions.is_none() &&
            self.scheduled_at.is_none() &&
            self.vehicle.is_none() &&
            self.porters_requested.is_none()
    }

    pub fn with_instructions<S: Into<String>>(mut self, instructions: S) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    pub fn with_vehicle(mut self, vehicle: VehicleType) -> Self {
        self.vehicle = Some(vehicle);
        self
    }

    pub fn with_porters_requested(mut self, count: i64) -> Self {
        self.porters_requested = Some(count);
        self
    }
}
