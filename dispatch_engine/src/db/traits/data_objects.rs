use chrono::{DateTime, Utc};
use pd_common::MoneyCents;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{
    db_types::{AssignmentStatus, Evidence, Order, OrderAssignment, OrderEvent, OrderItem, OrderStatus, OrderStop, PorterId},
    events::DomainEvent,
};

/// A full order view: the order row plus everything hanging off it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: Order,
    pub stops: Vec<OrderStop>,
    pub items: Vec<OrderItem>,
    pub assignments: Vec<OrderAssignment>,
    pub evidence: Vec<Evidence>,
}

/// The result of a committed order mutation, carrying the events that were written to the outbox so the caller can
/// fire in-process hooks after the fact.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub order: Order,
    pub events: Vec<DomainEvent>,
}

/// What to do with a set of porters, as computed by the assignment engine.
#[derive(Debug, Clone)]
pub struct AssignmentPlan {
    pub porters: Vec<PorterId>,
    pub assignment_status: AssignmentStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub order_status: OrderStatus,
    pub earnings: Option<MoneyCents>,
}

#[derive(Debug, Clone)]
pub struct AssignmentOutcome {
    pub order: Order,
    pub assignments: Vec<OrderAssignment>,
    pub events: Vec<DomainEvent>,
}

#[derive(Debug, Clone)]
pub struct AcceptOutcome {
    pub order: Order,
    pub assignment: OrderAssignment,
    /// The porters whose open offers were revoked when this acceptance won.
    pub revoked: Vec<PorterId>,
    pub events: Vec<DomainEvent>,
}

#[derive(Debug, Clone)]
pub struct StopOutcome {
    pub order: Order,
    pub stop: crate::db_types::OrderStop,
    pub events: Vec<DomainEvent>,
}

#[derive(Debug, Clone)]
pub struct EvidenceOutcome {
    pub order: Order,
    pub evidence: Evidence,
    pub events: Vec<DomainEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

/// Aggregate dispatch counts over a date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchStats {
    pub total_orders: i64,
    pub by_status: Vec<StatusCount>,
    pub booked_revenue: MoneyCents,
    pub cancellation_fees: MoneyCents,
}

/// One unpublished (or recently published) event in the transactional outbox.
#[derive(Debug, Clone, FromRow)]
pub struct OutboxRow {
    pub id: i64,
    pub event_id: String,
    pub topic: String,
    pub bus_key: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

/// A page of audit events, newest first.
pub type AuditTrail = Vec<OrderEvent>;
