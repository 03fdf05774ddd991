use std::{fmt::Debug, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use serde::Serialize;

use crate::{
    config::EngineConfig,
    db::traits::{DispatchDatabase, DispatchStats, IdempotencyStore, OrderDetail, OrderManagement},
    db_types::{
        ActorType,
        CorrelationId,
        NewEvidence,
        NewOrder,
        OrderEvent,
        OrderId,
        OrderStatus,
        OrderUpdate,
        PorterId,
        Requester,
        StopStatus,
    },
    dispatch_api::{
        assignment_api::{build_plan, BiddingStrategy},
        idempotency::{decode_outcome, StoredOutcome},
        order_objects::{
            AcceptOfferResult,
            AdminAction,
            AdminOverrideRequest,
            AdminOverrideResult,
            AssignPortersRequest,
            AssignPortersResult,
            AssignmentState,
            CancelResult,
            ChangeStatusRequest,
            ChangeStatusResult,
            CreateOrderRequest,
            CreateOrderResult,
            EvidenceResult,
            OrderPage,
            OrderQueryFilter,
            RejectOfferResult,
            UpdateOrderResult,
            WaypointResult,
        },
        pricing::PricingEngine,
        OrderFlowError,
    },
    events::{DomainEvent, EventPayload, EventProducers, OfferNotification, StatusChangeNotice},
    helpers::{fees::cancellation_fee, hashing::request_hash},
    transitions,
};

/// Retry budget for a mutation that loses the optimistic version check or hits a contended database, when the
/// caller did not pin a version: the first attempt plus up to this many re-reads, four attempts in total. Callers
/// that pin a version get exactly one attempt.
const MAX_CONCURRENCY_RETRIES: u64 = 3;
const RETRY_BACKOFF_MS: u64 = 25;

/// Order states in which the customer may still edit order fields.
const EDITABLE_STATUSES: [OrderStatus; 3] =
    [OrderStatus::Created, OrderStatus::TentativelyAssigned, OrderStatus::Assigned];

/// The number of ledger entries returned alongside a status change.
const TIMELINE_LEN: i64 = 10;

/// `OrderFlowApi` is the public face of the dispatch core: every client-facing operation goes through here. It
/// layers validation, access checks, idempotent replay and in-process event hooks over the storage backend, which
/// does the transactional heavy lifting.
pub struct OrderFlowApi<B, P> {
    db: B,
    pricing: P,
    producers: EventProducers,
    bidding: Option<Arc<dyn BiddingStrategy>>,
    idempotency_ttl: Duration,
    default_offer_expiry: Duration,
}

impl<B, P> Debug for OrderFlowApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B, P> OrderFlowApi<B, P> {
    pub fn new(db: B, pricing: P, config: &EngineConfig) -> Self {
        Self {
            db,
            pricing,
            producers: EventProducers::default(),
            bidding: None,
            idempotency_ttl: config.idempotency_ttl,
            default_offer_expiry: config.default_offer_expiry,
        }
    }

    pub fn with_producers(mut self, producers: EventProducers) -> Self {
        self.producers = producers;
        self
    }

    pub fn with_bidding_strategy(mut self, strategy: Arc<dyn BiddingStrategy>) -> Self {
        self.bidding = Some(strategy);
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, P> OrderFlowApi<B, P>
where
    B: DispatchDatabase + OrderManagement + IdempotencyStore,
    OrderFlowError: From<<B as DispatchDatabase>::Error>
        + From<<B as OrderManagement>::Error>
        + From<<B as IdempotencyStore>::Error>,
    P: PricingEngine,
{
    //--------------------------------------      Create        ---------------------------------------------------

    /// Creates a new transport order. The fare is obtained synchronously from the pricing engine before the order
    /// is written; a pricing failure aborts the whole operation.
    pub async fn create_order(
        &self,
        req: CreateOrderRequest,
        requester: &Requester,
        idempotency_key: Option<&str>,
        correlation_id: &CorrelationId,
    ) -> Result<CreateOrderResult, OrderFlowError> {
        if let Some(key) = idempotency_key {
            if let Some(record) = self.db.idempotency_record(key, Utc::now()).await? {
                return decode_outcome(key, &record.outcome);
            }
        }
        let result = self.create_order_inner(&req, requester, correlation_id).await;
        self.record_outcome(idempotency_key, &req, &result).await;
        result
    }

    async fn create_order_inner(
        &self,
        req: &CreateOrderRequest,
        requester: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<CreateOrderResult, OrderFlowError> {
        if requester.role == ActorType::Customer && requester.user_id != req.customer_id {
            return Err(OrderFlowError::Forbidden(requester.user_id.clone()));
        }
        if requester.role == ActorType::Porter {
            return Err(OrderFlowError::Forbidden(requester.user_id.clone()));
        }
        req.validate()?;
        let quote = self
            .pricing
            .estimate(&req.stops, req.vehicle, req.porters_requested)
            .await
            .map_err(|e| OrderFlowError::Upstream { service: "pricing", message: e.to_string() })?;
        trace!(
            "🚚️ Priced new order for {}: {} over {} m",
            req.customer_id,
            quote.total,
            quote.distance_meters
        );
        let mut order = NewOrder::new(req.customer_id.clone(), quote.total, req.vehicle)
            .with_porters(req.porters_requested);
        order.scheduled_at = req.scheduled_at;
        order.instructions = req.instructions.clone();
        let outcome =
            self.db.create_order(order, req.stops.clone(), req.items.clone(), requester, correlation_id).await?;
        self.dispatch_hooks(&outcome.events).await;
        info!("🚚️ Order {} created for customer {}", outcome.order.order_id, outcome.order.customer_id);
        Ok(CreateOrderResult {
            order_id: outcome.order.order_id,
            status: outcome.order.status,
            price: outcome.order.price,
            currency: outcome.order.currency,
            created_at: outcome.order.created_at,
        })
    }

    //--------------------------------------      Queries       ---------------------------------------------------

    /// The full order view. Customers see their own orders, porters the orders they hold an assignment on, and
    /// admins everything.
    pub async fn order(&self, oid: &OrderId, requester: &Requester) -> Result<OrderDetail, OrderFlowError> {
        let detail = self.db.order_detail(oid).await?.ok_or_else(|| OrderFlowError::NotFound(oid.clone()))?;
        Self::ensure_can_view(&detail, requester)?;
        Ok(detail)
    }

    /// Lists orders. The filter is scoped to the requester before it runs: customers are pinned to their own
    /// orders, porters to orders they have assignments on.
    pub async fn list_orders(
        &self,
        mut filter: OrderQueryFilter,
        requester: &Requester,
    ) -> Result<OrderPage, OrderFlowError> {
        match requester.role {
            ActorType::Customer => filter.customer_id = Some(requester.user_id.clone()),
            ActorType::Porter => filter.porter_id = Some(PorterId::from(requester.user_id.clone())),
            ActorType::Admin | ActorType::System => {},
        }
        let (orders, total) = self.db.search_orders(filter).await?;
        Ok(OrderPage { orders, total })
    }

    pub async fn audit_trail(&self, oid: &OrderId, limit: i64) -> Result<Vec<OrderEvent>, OrderFlowError> {
        let events = self.db.audit_trail(oid, limit).await?;
        Ok(events)
    }

    pub async fn statistics(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<DispatchStats, OrderFlowError> {
        let stats = self.db.statistics(since, until).await?;
        Ok(stats)
    }

    //--------------------------------------      Update        ---------------------------------------------------

    /// Applies editable-field changes to an order that has not yet been accepted by a porter.
    pub async fn update_order(
        &self,
        oid: &OrderId,
        update: OrderUpdate,
        requester: &Requester,
        idempotency_key: Option<&str>,
        correlation_id: &CorrelationId,
    ) -> Result<UpdateOrderResult, OrderFlowError> {
        if let Some(key) = idempotency_key {
            if let Some(record) = self.db.idempotency_record(key, Utc::now()).await? {
                return decode_outcome(key, &record.outcome);
            }
        }
        let result = self.update_order_inner(oid, &update, requester, correlation_id).await;
        self.record_outcome(idempotency_key, &update, &result).await;
        result
    }

    async fn update_order_inner(
        &self,
        oid: &OrderId,
        update: &OrderUpdate,
        requester: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<UpdateOrderResult, OrderFlowError> {
        let mut attempt = 0;
        loop {
            let order = self.db.order_by_id(oid).await?.ok_or_else(|| OrderFlowError::NotFound(oid.clone()))?;
            match requester.role {
                ActorType::Customer if order.customer_id != requester.user_id => {
                    return Err(OrderFlowError::Forbidden(requester.user_id.clone()))
                },
                ActorType::Porter => return Err(OrderFlowError::Forbidden(requester.user_id.clone())),
                _ => {},
            }
            if !EDITABLE_STATUSES.contains(&order.status) {
                return Err(OrderFlowError::UpdateNotAllowed { order_id: oid.clone(), status: order.status });
            }
            match self.db.update_order(oid, order.version, update.clone(), requester, correlation_id).await {
                Ok(outcome) => {
                    self.dispatch_hooks(&outcome.events).await;
                    return Ok(UpdateOrderResult {
                        order_id: outcome.order.order_id,
                        version: outcome.order.version,
                        updated_at: outcome.order.updated_at,
                    });
                },
                Err(e) => {
                    attempt += 1;
                    self.bail_or_backoff(oid, e.into(), attempt).await?;
                },
            }
        }
    }

    //--------------------------------------      Cancel        ---------------------------------------------------

    /// Cancels an order on the customer's or dispatcher's behalf. Free while no porter has committed; a 20% fee
    /// applies once the order has been accepted.
    pub async fn cancel_order(
        &self,
        oid: &OrderId,
        reason: &str,
        requester: &Requester,
        idempotency_key: Option<&str>,
        correlation_id: &CorrelationId,
    ) -> Result<CancelResult, OrderFlowError> {
        if let Some(key) = idempotency_key {
            if let Some(record) = self.db.idempotency_record(key, Utc::now()).await? {
                return decode_outcome(key, &record.outcome);
            }
        }
        let result = self.cancel_order_inner(oid, reason, requester, false, correlation_id).await;
        self.record_outcome(idempotency_key, &(oid, reason), &result).await;
        result
    }

    async fn cancel_order_inner(
        &self,
        oid: &OrderId,
        reason: &str,
        requester: &Requester,
        force: bool,
        correlation_id: &CorrelationId,
    ) -> Result<CancelResult, OrderFlowError> {
        let mut attempt = 0;
        loop {
            let order = self.db.order_by_id(oid).await?.ok_or_else(|| OrderFlowError::NotFound(oid.clone()))?;
            if requester.role == ActorType::Customer && order.customer_id != requester.user_id {
                return Err(OrderFlowError::Forbidden(requester.user_id.clone()));
            }
            match order.status {
                OrderStatus::Cancelled => return Err(OrderFlowError::AlreadyCancelled(oid.clone())),
                OrderStatus::Completed | OrderStatus::Closed => {
                    return Err(OrderFlowError::AlreadyCompleted(oid.clone()))
                },
                _ => {},
            }
            // An admin force-cancel skips the transition table but still pays the normal fee schedule.
            if !force {
                transitions::check(oid, order.status, OrderStatus::Cancelled)?;
            }
            let fee = cancellation_fee(order.status, order.price);
            let refund = order.price - fee;
            let res = self
                .db
                .cancel_order(oid, order.version, &requester.user_id, reason, fee, refund, requester, correlation_id)
                .await;
            match res {
                Ok(outcome) => {
                    self.dispatch_hooks(&outcome.events).await;
                    info!("🚚️ Order {oid} cancelled. Fee {fee}, refund {refund}");
                    return Ok(CancelResult {
                        order_id: outcome.order.order_id,
                        status: outcome.order.status,
                        fee,
                        refund,
                        cancelled_at: outcome.order.cancelled_at.unwrap_or(outcome.order.updated_at),
                    });
                },
                Err(e) => {
                    attempt += 1;
                    self.bail_or_backoff(oid, e.into(), attempt).await?;
                },
            }
        }
    }

    //--------------------------------------   Change status    ---------------------------------------------------

    /// Moves an order along its lifecycle. The transition is validated against the state machine before the write;
    /// the write itself is version-gated so the validated status is still the one being replaced.
    pub async fn change_status(
        &self,
        oid: &OrderId,
        req: ChangeStatusRequest,
        requester: &Requester,
        idempotency_key: Option<&str>,
        correlation_id: &CorrelationId,
    ) -> Result<ChangeStatusResult, OrderFlowError> {
        if let Some(key) = idempotency_key {
            if let Some(record) = self.db.idempotency_record(key, Utc::now()).await? {
                return decode_outcome(key, &record.outcome);
            }
        }
        let result = self.change_status_inner(oid, &req, requester, correlation_id).await;
        self.record_outcome(idempotency_key, &req, &result).await;
        result
    }

    async fn change_status_inner(
        &self,
        oid: &OrderId,
        req: &ChangeStatusRequest,
        requester: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<ChangeStatusResult, OrderFlowError> {
        if requester.role == ActorType::Customer {
            return Err(OrderFlowError::Forbidden(requester.user_id.clone()));
        }
        let mut attempt = 0;
        loop {
            let order = self.db.order_by_id(oid).await?.ok_or_else(|| OrderFlowError::NotFound(oid.clone()))?;
            transitions::check(oid, order.status, req.new_status)?;
            let expected_version = req.expected_version.unwrap_or(order.version);
            let res = self
                .db
                .set_order_status(oid, expected_version, req.new_status, req.location, requester, correlation_id)
                .await;
            match res {
                Ok(outcome) => {
                    self.dispatch_hooks(&outcome.events).await;
                    let timeline = self.db.audit_trail(oid, TIMELINE_LEN).await?;
                    return Ok(ChangeStatusResult {
                        order_id: outcome.order.order_id,
                        status: outcome.order.status,
                        version: outcome.order.version,
                        timeline,
                    });
                },
                Err(e) => {
                    let err: OrderFlowError = e.into();
                    // A caller-pinned version is a strict precondition; never retry past it.
                    if req.expected_version.is_some() {
                        return Err(err);
                    }
                    attempt += 1;
                    self.bail_or_backoff(oid, err, attempt).await?;
                },
            }
        }
    }

    //--------------------------------------    Assignments     ---------------------------------------------------

    /// Attaches porters to an order using the requested strategy. Offers go out with a shared deadline and one
    /// notification per porter; direct assignments skip the offer protocol entirely.
    pub async fn assign_porters(
        &self,
        oid: &OrderId,
        req: AssignPortersRequest,
        requester: &Requester,
        idempotency_key: Option<&str>,
        correlation_id: &CorrelationId,
    ) -> Result<AssignPortersResult, OrderFlowError> {
        if let Some(key) = idempotency_key {
            if let Some(record) = self.db.idempotency_record(key, Utc::now()).await? {
                return decode_outcome(key, &record.outcome);
            }
        }
        let result = self.assign_porters_inner(oid, &req, requester, correlation_id).await;
        self.record_outcome(idempotency_key, &req, &result).await;
        result
    }

    async fn assign_porters_inner(
        &self,
        oid: &OrderId,
        req: &AssignPortersRequest,
        requester: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<AssignPortersResult, OrderFlowError> {
        if matches!(requester.role, ActorType::Customer | ActorType::Porter) {
            return Err(OrderFlowError::Forbidden(requester.user_id.clone()));
        }
        let mut attempt = 0;
        loop {
            let order = self.db.order_by_id(oid).await?.ok_or_else(|| OrderFlowError::NotFound(oid.clone()))?;
            let plan = build_plan(&order, req, self.default_offer_expiry, self.bidding.as_deref())?;
            if plan.order_status != order.status {
                transitions::check(oid, order.status, plan.order_status)?;
            }
            match self.db.assign_porters(oid, order.version, plan, requester, correlation_id).await {
                Ok(outcome) => {
                    self.dispatch_hooks(&outcome.events).await;
                    info!("🚚️ {} porters attached to order {oid}", outcome.assignments.len());
                    let assignments = outcome
                        .assignments
                        .into_iter()
                        .map(|a| AssignmentState { porter_id: a.porter_id, status: a.status, expires_at: a.expires_at })
                        .collect();
                    return Ok(AssignPortersResult { order_id: outcome.order.order_id, status: outcome.order.status, assignments });
                },
                Err(e) => {
                    attempt += 1;
                    self.bail_or_backoff(oid, e.into(), attempt).await?;
                },
            }
        }
    }

    /// A porter accepts an open offer. First committed acceptance wins: the winner's assignment becomes accepted,
    /// every other open offer is revoked, and latecomers get the expired or already-accepted error.
    pub async fn accept_offer(
        &self,
        oid: &OrderId,
        porter_id: &PorterId,
        requester: &Requester,
        idempotency_key: Option<&str>,
        correlation_id: &CorrelationId,
    ) -> Result<AcceptOfferResult, OrderFlowError> {
        if let Some(key) = idempotency_key {
            if let Some(record) = self.db.idempotency_record(key, Utc::now()).await? {
                return decode_outcome(key, &record.outcome);
            }
        }
        let result = self.accept_offer_inner(oid, porter_id, requester, correlation_id).await;
        self.record_outcome(idempotency_key, &(oid, porter_id), &result).await;
        result
    }

    async fn accept_offer_inner(
        &self,
        oid: &OrderId,
        porter_id: &PorterId,
        requester: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<AcceptOfferResult, OrderFlowError> {
        Self::ensure_is_porter(porter_id, requester)?;
        // Racing acceptors contend for the write lock; losers re-read so they see the winner's commit and get the
        // business answer rather than a lock error.
        let mut attempt = 0;
        let outcome = loop {
            match self.db.accept_offer(oid, porter_id, Utc::now(), requester, correlation_id).await {
                Ok(outcome) => break outcome,
                Err(e) => {
                    attempt += 1;
                    self.bail_or_backoff(oid, e.into(), attempt).await?;
                },
            }
        };
        self.dispatch_hooks(&outcome.events).await;
        info!("🚚️ Porter {porter_id} accepted order {oid}. {} other offers revoked", outcome.revoked.len());
        Ok(AcceptOfferResult {
            order_id: outcome.order.order_id,
            porter_id: outcome.assignment.porter_id,
            status: outcome.assignment.status,
            accepted_at: outcome.assignment.accepted_at,
            revoked: outcome.revoked,
        })
    }

    /// A porter declines an open offer. Other offers and the order status are untouched.
    pub async fn reject_offer(
        &self,
        oid: &OrderId,
        porter_id: &PorterId,
        reason: Option<String>,
        requester: &Requester,
        idempotency_key: Option<&str>,
        correlation_id: &CorrelationId,
    ) -> Result<RejectOfferResult, OrderFlowError> {
        if let Some(key) = idempotency_key {
            if let Some(record) = self.db.idempotency_record(key, Utc::now()).await? {
                return decode_outcome(key, &record.outcome);
            }
        }
        let result = self.reject_offer_inner(oid, porter_id, reason, requester, correlation_id).await;
        self.record_outcome(idempotency_key, &(oid, porter_id), &result).await;
        result
    }

    async fn reject_offer_inner(
        &self,
        oid: &OrderId,
        porter_id: &PorterId,
        reason: Option<String>,
        requester: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<RejectOfferResult, OrderFlowError> {
        Self::ensure_is_porter(porter_id, requester)?;
        let mut attempt = 0;
        let outcome = loop {
            match self.db.reject_offer(oid, porter_id, reason.clone(), requester, correlation_id).await {
                Ok(outcome) => break outcome,
                Err(e) => {
                    attempt += 1;
                    self.bail_or_backoff(oid, e.into(), attempt).await?;
                },
            }
        };
        let assignment = outcome
            .assignments
            .into_iter()
            .next()
            .ok_or_else(|| OrderFlowError::AssignmentNotFound { order_id: oid.clone(), porter_id: porter_id.clone() })?;
        Ok(RejectOfferResult { order_id: outcome.order.order_id, porter_id: assignment.porter_id, status: assignment.status })
    }

    //--------------------------------------      Waypoints     ---------------------------------------------------

    /// Moves a waypoint through its lifecycle. Arrival stamps the arrival time, completion stamps the departure
    /// time, and skipping stamps neither.
    pub async fn update_waypoint_status(
        &self,
        oid: &OrderId,
        stop_id: i64,
        new_status: StopStatus,
        requester: &Requester,
        idempotency_key: Option<&str>,
        correlation_id: &CorrelationId,
    ) -> Result<WaypointResult, OrderFlowError> {
        if let Some(key) = idempotency_key {
            if let Some(record) = self.db.idempotency_record(key, Utc::now()).await? {
                return decode_outcome(key, &record.outcome);
            }
        }
        let result = self.update_waypoint_inner(oid, stop_id, new_status, requester, correlation_id).await;
        self.record_outcome(idempotency_key, &(oid, stop_id, new_status), &result).await;
        result
    }

    async fn update_waypoint_inner(
        &self,
        oid: &OrderId,
        stop_id: i64,
        new_status: StopStatus,
        requester: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<WaypointResult, OrderFlowError> {
        let detail = self.db.order_detail(oid).await?.ok_or_else(|| OrderFlowError::NotFound(oid.clone()))?;
        Self::ensure_can_view(&detail, requester)?;
        let stop = detail
            .stops
            .iter()
            .find(|s| s.id == stop_id)
            .ok_or_else(|| OrderFlowError::StopNotFound { order_id: oid.clone(), stop_id })?;
        if !transitions::stop_transition_allowed(stop.status, new_status) {
            return Err(OrderFlowError::Validation(format!(
                "Waypoint {stop_id} cannot move from {} to {new_status}",
                stop.status
            )));
        }
        let outcome = self.db.update_stop_status(oid, stop_id, new_status, requester, correlation_id).await?;
        self.dispatch_hooks(&outcome.events).await;
        Ok(WaypointResult {
            order_id: outcome.order.order_id,
            stop_id: outcome.stop.id,
            status: outcome.stop.status,
            arrived_at: outcome.stop.arrived_at,
            departed_at: outcome.stop.departed_at,
        })
    }

    //--------------------------------------      Evidence      ---------------------------------------------------

    /// Attaches proof-of-service (photo, signature, …) to an order.
    pub async fn create_evidence(
        &self,
        oid: &OrderId,
        evidence: NewEvidence,
        requester: &Requester,
        idempotency_key: Option<&str>,
        correlation_id: &CorrelationId,
    ) -> Result<EvidenceResult, OrderFlowError> {
        if let Some(key) = idempotency_key {
            if let Some(record) = self.db.idempotency_record(key, Utc::now()).await? {
                return decode_outcome(key, &record.outcome);
            }
        }
        let result = self.create_evidence_inner(oid, &evidence, requester, correlation_id).await;
        self.record_outcome(idempotency_key, &evidence, &result).await;
        result
    }

    async fn create_evidence_inner(
        &self,
        oid: &OrderId,
        evidence: &NewEvidence,
        requester: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<EvidenceResult, OrderFlowError> {
        if requester.role == ActorType::Customer {
            return Err(OrderFlowError::Forbidden(requester.user_id.clone()));
        }
        if evidence.url.trim().is_empty() {
            return Err(OrderFlowError::Validation("Evidence needs a url".to_string()));
        }
        let outcome = self.db.insert_evidence(oid, evidence.clone(), requester, correlation_id).await?;
        self.dispatch_hooks(&outcome.events).await;
        Ok(EvidenceResult {
            order_id: outcome.order.order_id,
            evidence_id: outcome.evidence.id,
            uploaded_at: outcome.evidence.created_at,
        })
    }

    //--------------------------------------   Admin override   ---------------------------------------------------

    /// Out-of-band corrections for operations staff. Force actions skip the transition table; `reassign` is
    /// declared but deliberately unsupported until its semantics are settled.
    pub async fn admin_override(
        &self,
        oid: &OrderId,
        req: AdminOverrideRequest,
        requester: &Requester,
        idempotency_key: Option<&str>,
        correlation_id: &CorrelationId,
    ) -> Result<AdminOverrideResult, OrderFlowError> {
        if let Some(key) = idempotency_key {
            if let Some(record) = self.db.idempotency_record(key, Utc::now()).await? {
                return decode_outcome(key, &record.outcome);
            }
        }
        let result = self.admin_override_inner(oid, &req, requester, correlation_id).await;
        self.record_outcome(idempotency_key, &req, &result).await;
        result
    }

    async fn admin_override_inner(
        &self,
        oid: &OrderId,
        req: &AdminOverrideRequest,
        requester: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<AdminOverrideResult, OrderFlowError> {
        if requester.role != ActorType::Admin {
            return Err(OrderFlowError::Forbidden(requester.user_id.clone()));
        }
        warn!("🚨️ Admin {} invoked {:?} on order {oid}: {}", requester.user_id, req.action, req.reason);
        match req.action {
            AdminAction::ForceComplete => {
                let order = self.db.order_by_id(oid).await?.ok_or_else(|| OrderFlowError::NotFound(oid.clone()))?;
                match order.status {
                    OrderStatus::Cancelled => return Err(OrderFlowError::AlreadyCancelled(oid.clone())),
                    OrderStatus::Completed | OrderStatus::Closed => {
                        return Err(OrderFlowError::AlreadyCompleted(oid.clone()))
                    },
                    _ => {},
                }
                let outcome = self
                    .db
                    .set_order_status(oid, order.version, OrderStatus::Completed, None, requester, correlation_id)
                    .await?;
                self.dispatch_hooks(&outcome.events).await;
                Ok(AdminOverrideResult {
                    order_id: outcome.order.order_id,
                    status: outcome.order.status,
                    message: format!("Order forced to COMPLETED: {}", req.reason),
                })
            },
            AdminAction::ForceCancel => {
                let result = self.cancel_order_inner(oid, &req.reason, requester, true, correlation_id).await?;
                Ok(AdminOverrideResult {
                    order_id: result.order_id,
                    status: result.status,
                    message: format!("Order force-cancelled with fee {}: {}", result.fee, req.reason),
                })
            },
            AdminAction::Reassign => Err(OrderFlowError::Unsupported("Admin reassignments".to_string())),
            AdminAction::ResolveDispute => {
                let order = self.db.order_by_id(oid).await?.ok_or_else(|| OrderFlowError::NotFound(oid.clone()))?;
                let outcome = self.db.set_dispute(oid, order.version, false, requester, correlation_id).await?;
                Ok(AdminOverrideResult {
                    order_id: outcome.order.order_id,
                    status: outcome.order.status,
                    message: format!("Dispute resolved: {}", req.reason),
                })
            },
        }
    }

    //--------------------------------------      Plumbing      ---------------------------------------------------

    fn ensure_can_view(detail: &OrderDetail, requester: &Requester) -> Result<(), OrderFlowError> {
        let allowed = match requester.role {
            ActorType::Admin | ActorType::System => true,
            ActorType::Customer => detail.order.customer_id == requester.user_id,
            ActorType::Porter => detail.assignments.iter().any(|a| a.porter_id.0 == requester.user_id),
        };
        if allowed {
            Ok(())
        } else {
            Err(OrderFlowError::Forbidden(requester.user_id.clone()))
        }
    }

    fn ensure_is_porter(porter_id: &PorterId, requester: &Requester) -> Result<(), OrderFlowError> {
        let allowed = match requester.role {
            ActorType::Admin | ActorType::System => true,
            ActorType::Porter => requester.user_id == porter_id.0,
            ActorType::Customer => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(OrderFlowError::Forbidden(requester.user_id.clone()))
        }
    }

    /// Returns `Ok(())` when the error was a version conflict or transient lock contention and a retry is still
    /// allowed; the caller's loop then re-reads and tries again. Everything else, including an exhausted retry
    /// budget, propagates.
    async fn bail_or_backoff(&self, oid: &OrderId, err: OrderFlowError, attempt: u64) -> Result<(), OrderFlowError> {
        match err {
            OrderFlowError::Concurrency(_) | OrderFlowError::Contention if attempt <= MAX_CONCURRENCY_RETRIES => {
                debug!("🚚️ Write conflict on order {oid}, attempt {attempt}. Re-reading and retrying.");
                tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt)).await;
                Ok(())
            },
            e => Err(e),
        }
    }

    /// Fires the in-process hooks for the events a committed mutation produced. Best-effort: the mutation has
    /// already committed, so hook failures are logged by the channel and never surface here.
    async fn dispatch_hooks(&self, events: &[DomainEvent]) {
        for event in events {
            match &event.payload {
                EventPayload::PorterOffered { order_id, porter_id, expires_at } => {
                    let notice = OfferNotification {
                        order_id: order_id.clone(),
                        porter_id: porter_id.clone(),
                        expires_at: *expires_at,
                    };
                    for producer in &self.producers.offer_producers {
                        producer.publish_event(notice.clone()).await;
                    }
                },
                EventPayload::OrderStatusChanged { order_id, previous, new } => {
                    let notice =
                        StatusChangeNotice { order_id: order_id.clone(), previous: *previous, current: *new };
                    for producer in &self.producers.status_producers {
                        producer.publish_event(notice.clone()).await;
                    }
                },
                _ => {},
            }
        }
    }

    /// Persists the outcome of a first execution under the idempotency key. Version conflicts and infrastructure
    /// errors are not stored: the caller is expected to retry those with the same key and should re-execute.
    async fn record_outcome<T, R>(&self, key: Option<&str>, request: &R, result: &Result<T, OrderFlowError>)
    where
        T: Serialize,
        R: Serialize,
    {
        let Some(key) = key else { return };
        if matches!(
            result,
            Err(OrderFlowError::Concurrency(_)) | Err(OrderFlowError::Contention) | Err(OrderFlowError::DatabaseError(_))
        ) {
            return;
        }
        let stored = match StoredOutcome::from_result(result) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("♻️ Could not capture the outcome for idempotency key {key}: {e}");
                return;
            },
        };
        let outcome = match serde_json::to_string(&stored) {
            Ok(s) => s,
            Err(e) => {
                warn!("♻️ Could not serialize the outcome for idempotency key {key}: {e}");
                return;
            },
        };
        let input_hash = request_hash(request);
        if let Err(e) = self.db.store_idempotency_record(key, &outcome, &input_hash, self.idempotency_ttl).await {
            warn!("♻️ Could not store the outcome for idempotency key {key}: {e}");
        }
    }
}
