use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use pd_common::MoneyCents;
use serde::{Deserialize, Serialize};

use crate::db_types::{CorrelationId, OrderId, OrderStatus, PorterId, StopStatus};

pub fn random_event_id() -> String {
    let n: u64 = rand::random();
    format!("evt-{n:016x}")
}

/// The envelope for every event published to downstream consumers. Events are written to the outbox in the same
/// transaction as the state change they describe and relayed with at-least-once delivery, so consumers deduplicate
/// by `event_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: CorrelationId,
    /// The order version after the mutation this event describes.
    pub version: i64,
    #[serde(flatten)]
    pub payload: EventPayload,
    /// Forward-compatible attributes. Bounded to known scalar values; not a dumping ground for entity snapshots.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DomainEvent {
    pub fn new(correlation_id: CorrelationId, version: i64, payload: EventPayload) -> Self {
        Self {
            event_id: random_event_id(),
            timestamp: Utc::now(),
            correlation_id,
            version,
            payload,
            extra: BTreeMap::new(),
        }
    }

    /// The topic family this event is published under.
    pub fn topic(&self) -> &'static str {
        use EventPayload::*;
        match &self.payload {
            OrderCreated { .. } => "orders.created",
            OrderUpdated { .. } => "orders.updated",
            OrderAssigned { .. } => "orders.assigned",
            PorterOffered { .. } => "porters.offered",
            PorterOfferExpired { .. } => "porters.offer_expired",
            OrderStatusChanged { .. } => "orders.status_changed",
            OrderCancelled { .. } => "orders.cancelled",
            OrderCompleted { .. } => "orders.completed",
            WaypointStatusChanged { .. } => "orders.waypoint_status",
            EvidenceUploaded { .. } => "orders.evidence",
        }
    }

    /// The partition key: the porter id for offer events, the order id for everything else.
    pub fn key(&self) -> String {
        use EventPayload::*;
        match &self.payload {
            PorterOffered { porter_id, .. } | PorterOfferExpired { porter_id, .. } => porter_id.0.clone(),
            OrderCreated { order_id, .. } |
            OrderUpdated { order_id, .. } |
            OrderAssigned { order_id, .. } |
            OrderStatusChanged { order_id, .. } |
            OrderCancelled { order_id, .. } |
            OrderCompleted { order_id } |
            WaypointStatusChanged { order_id, .. } |
            EvidenceUploaded { order_id, .. } => order_id.0.clone(),
        }
    }
}

/// The typed payloads for every event the dispatch core publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    OrderCreated {
        order_id: OrderId,
        customer_id: String,
        price: MoneyCents,
        currency: String,
        porters_requested: i64,
    },
    OrderUpdated {
        order_id: OrderId,
        changed_fields: Vec<String>,
    },
    OrderAssigned {
        order_id: OrderId,
        porter_ids: Vec<PorterId>,
    },
    PorterOffered {
        order_id: OrderId,
        porter_id: PorterId,
        expires_at: Option<DateTime<Utc>>,
    },
    PorterOfferExpired {
        order_id: OrderId,
        porter_id: PorterId,
    },
    OrderStatusChanged {
        order_id: OrderId,
        previous: OrderStatus,
        new: OrderStatus,
    },
    OrderCancelled {
        order_id: OrderId,
        cancelled_by: String,
        reason: String,
        fee: MoneyCents,
        refund: MoneyCents,
    },
    OrderCompleted {
        order_id: OrderId,
    },
    WaypointStatusChanged {
        order_id: OrderId,
        stop_id: i64,
        sequence: i64,
        previous: StopStatus,
        new: StopStatus,
    },
    EvidenceUploaded {
        order_id: OrderId,
        evidence_id: i64,
        evidence_type: String,
        url: String,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn envelope_round_trips_with_tagged_payload() {
        let ev = DomainEvent::new(
            CorrelationId::from("corr-1"),
            4,
            EventPayload::OrderStatusChanged {
                order_id: OrderId::from("ord-1".to_string()),
                previous: OrderStatus::Accepted,
                new: OrderStatus::Arrived,
            },
        );
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains(r#""type":"order_status_changed""#));
        assert!(json.contains(r#""previous":"ACCEPTED""#));
        let back: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn offer_events_are_keyed_by_porter() {
        let ev = DomainEvent::new(
            CorrelationId::random(),
            1,
            EventPayload::PorterOffered {
                order_id: OrderId::from("ord-9".to_string()),
                porter_id: PorterId::from("p42"),
                expires_at: None,
            },
        );
        assert_eq!(ev.topic(), "porters.offered");
        assert_eq!(ev.key(), "p42");
    }
}
