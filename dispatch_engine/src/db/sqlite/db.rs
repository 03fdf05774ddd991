use std::{fmt::Debug, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use pd_common::MoneyCents;
use serde_json::json;
use sqlx::SqlitePool;

use crate::{
    db::{
        sqlite::{
            assignments,
            db_url,
            evidence as evidence_queries,
            idempotency,
            items,
            new_pool,
            order_events,
            orders,
            outbox,
            stops,
            SqliteDatabaseError,
        },
        traits::{
            AcceptOutcome,
            AssignmentOutcome,
            AssignmentPlan,
            DispatchDatabase,
            DispatchStats,
            EvidenceOutcome,
            IdempotencyStore,
            MutationOutcome,
            OrderDetail,
            OrderManagement,
            OutboxManagement,
            OutboxRow,
            StatusCount,
            StopOutcome,
        },
    },
    db_types::{
        AssignmentStatus,
        CorrelationId,
        IdempotencyRecord,
        NewEvidence,
        NewItem,
        NewOrder,
        NewStop,
        Order,
        OrderAssignment,
        OrderEvent,
        OrderId,
        OrderStatus,
        OrderUpdate,
        PorterId,
        Requester,
        StopStatus,
    },
    dispatch_api::order_objects::OrderQueryFilter,
    events::{DomainEvent, EventPayload},
    helpers::geo::GeoPoint,
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL from the environment.
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn require_order(
        oid: &OrderId,
        conn: &mut sqlx::SqliteConnection,
    ) -> Result<Order, SqliteDatabaseError> {
        orders::fetch_order(oid, conn).await?.ok_or_else(|| SqliteDatabaseError::OrderNotFound(oid.clone()))
    }
}

impl DispatchDatabase for SqliteDatabase {
    type Error = SqliteDatabaseError;

    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_order(
        &self,
        order: NewOrder,
        new_stops: Vec<NewStop>,
        new_items: Vec<NewItem>,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<MutationOutcome, Self::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let saved = orders::insert_order(&order, now, &mut tx).await?;
        stops::insert_stops(saved.id, &new_stops, now, &mut tx).await?;
        items::insert_items(saved.id, &new_items, &mut tx).await?;
        let payload = json!({
            "new": { "status": saved.status, "price": saved.price, "stops": new_stops.len(), "items": new_items.len() },
        });
        order_events::append_event(saved.id, "order_created", &payload, actor, None, correlation_id, now, &mut tx)
            .await?;
        let event = DomainEvent::new(
            correlation_id.clone(),
            saved.version,
            EventPayload::OrderCreated {
                order_id: saved.order_id.clone(),
                customer_id: saved.customer_id.clone(),
                price: saved.price,
                currency: saved.currency.clone(),
                porters_requested: saved.porters_requested,
            },
        );
        outbox::enqueue(&event, now, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} created for customer {}", saved.order_id, saved.customer_id);
        Ok(MutationOutcome { order: saved, events: vec![event] })
    }

    async fn update_order(
        &self,
        oid: &OrderId,
        expected_version: i64,
        update: OrderUpdate,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<MutationOutcome, Self::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let before = Self::require_order(oid, &mut tx).await?;
        if !orders::update_fields_with_version(before.id, expected_version, &update, now, &mut tx).await? {
            return Err(SqliteDatabaseError::VersionConflict(oid.clone()));
        }
        let after = Self::require_order(oid, &mut tx).await?;
        let mut changed_fields = Vec::new();
        if update.instructions.is_some() {
            changed_fields.push("instructions".to_string());
        }
        if update.scheduled_at.is_some() {
            changed_fields.push("scheduled_at".to_string());
        }
        if update.vehicle.is_some() {
            changed_fields.push("vehicle".to_string());
        }
        if update.porters_requested.is_some() {
            changed_fields.push("porters_requested".to_string());
        }
        let payload = json!({
            "previous": {
                "instructions": before.instructions, "scheduled_at": before.scheduled_at,
                "vehicle": before.vehicle, "porters_requested": before.porters_requested,
            },
            "new": {
                "instructions": after.instructions, "scheduled_at": after.scheduled_at,
                "vehicle": after.vehicle, "porters_requested": after.porters_requested,
            },
        });
        order_events::append_event(before.id, "order_updated", &payload, actor, None, correlation_id, now, &mut tx)
            .await?;
        let event = DomainEvent::new(
            correlation_id.clone(),
            after.version,
            EventPayload::OrderUpdated { order_id: oid.clone(), changed_fields },
        );
        outbox::enqueue(&event, now, &mut tx).await?;
        tx.commit().await?;
        Ok(MutationOutcome { order: after, events: vec![event] })
    }

    async fn set_order_status(
        &self,
        oid: &OrderId,
        expected_version: i64,
        new_status: OrderStatus,
        location: Option<GeoPoint>,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<MutationOutcome, Self::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let before = Self::require_order(oid, &mut tx).await?;
        if !orders::set_status_with_version(before.id, expected_version, new_status, now, &mut tx).await? {
            return Err(SqliteDatabaseError::VersionConflict(oid.clone()));
        }
        let after = Self::require_order(oid, &mut tx).await?;
        let payload = json!({ "previous": { "status": before.status }, "new": { "status": new_status } });
        order_events::append_event(
            before.id,
            "status_changed",
            &payload,
            actor,
            location,
            correlation_id,
            now,
            &mut tx,
        )
        .await?;
        let mut events = vec![DomainEvent::new(
            correlation_id.clone(),
            after.version,
            EventPayload::OrderStatusChanged { order_id: oid.clone(), previous: before.status, new: new_status },
        )];
        if new_status == OrderStatus::Completed {
            events.push(DomainEvent::new(
                correlation_id.clone(),
                after.version,
                EventPayload::OrderCompleted { order_id: oid.clone() },
            ));
        }
        for event in &events {
            outbox::enqueue(event, now, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ Order {oid} moved {} -> {new_status}", before.status);
        Ok(MutationOutcome { order: after, events })
    }

    async fn cancel_order(
        &self,
        oid: &OrderId,
        expected_version: i64,
        cancelled_by: &str,
        reason: &str,
        fee: MoneyCents,
        refund: MoneyCents,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<MutationOutcome, Self::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let before = Self::require_order(oid, &mut tx).await?;
        if !orders::set_cancelled_with_version(before.id, expected_version, cancelled_by, reason, fee, now, &mut tx)
            .await?
        {
            return Err(SqliteDatabaseError::VersionConflict(oid.clone()));
        }
        let after = Self::require_order(oid, &mut tx).await?;
        let payload = json!({
            "previous": { "status": before.status },
            "new": { "status": OrderStatus::Cancelled, "fee": fee, "refund": refund, "reason": reason },
        });
        order_events::append_event(before.id, "order_cancelled", &payload, actor, None, correlation_id, now, &mut tx)
            .await?;
        let event = DomainEvent::new(
            correlation_id.clone(),
            after.version,
            EventPayload::OrderCancelled {
                order_id: oid.clone(),
                cancelled_by: cancelled_by.to_string(),
                reason: reason.to_string(),
                fee,
                refund,
            },
        );
        outbox::enqueue(&event, now, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {oid} cancelled by {cancelled_by}. Fee {fee}, refund {refund}");
        Ok(MutationOutcome { order: after, events: vec![event] })
    }

    async fn assign_porters(
        &self,
        oid: &OrderId,
        expected_version: i64,
        plan: AssignmentPlan,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<AssignmentOutcome, Self::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let before = Self::require_order(oid, &mut tx).await?;
        let mut created = Vec::with_capacity(plan.porters.len());
        for porter in &plan.porters {
            let assignment = assignments::insert_assignment(
                before.id,
                oid,
                porter,
                plan.assignment_status,
                plan.expires_at,
                plan.earnings,
                now,
                &mut tx,
            )
            .await?;
            created.push(assignment);
        }
        if !orders::set_status_with_version(before.id, expected_version, plan.order_status, now, &mut tx).await? {
            return Err(SqliteDatabaseError::VersionConflict(oid.clone()));
        }
        if plan.assignment_status == AssignmentStatus::Accepted {
            let accepted = assignments::fetch_assignments(before.id, &mut tx)
                .await?
                .iter()
                .filter(|a| a.status == AssignmentStatus::Accepted)
                .count() as i64;
            orders::set_porters_assigned(before.id, accepted, now, &mut tx).await?;
        }
        let after = Self::require_order(oid, &mut tx).await?;
        let payload = json!({
            "previous": { "status": before.status },
            "new": {
                "status": plan.order_status,
                "porters": plan.porters,
                "assignment_status": plan.assignment_status,
                "expires_at": plan.expires_at,
            },
        });
        order_events::append_event(before.id, "porters_assigned", &payload, actor, None, correlation_id, now, &mut tx)
            .await?;
        let events = if plan.assignment_status == AssignmentStatus::Offered {
            plan.porters
                .iter()
                .map(|porter| {
                    DomainEvent::new(
                        correlation_id.clone(),
                        after.version,
                        EventPayload::PorterOffered {
                            order_id: oid.clone(),
                            porter_id: porter.clone(),
                            expires_at: plan.expires_at,
                        },
                    )
                })
                .collect::<Vec<_>>()
        } else {
            vec![DomainEvent::new(
                correlation_id.clone(),
                after.version,
                EventPayload::OrderAssigned { order_id: oid.clone(), porter_ids: plan.porters.clone() },
            )]
        };
        for event in &events {
            outbox::enqueue(event, now, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ {} porters attached to order {oid} as {}", plan.porters.len(), plan.assignment_status);
        Ok(AssignmentOutcome { order: after, assignments: created, events })
    }

    async fn accept_offer(
        &self,
        oid: &OrderId,
        porter_id: &PorterId,
        now: DateTime<Utc>,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<AcceptOutcome, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let order = Self::require_order(oid, &mut tx).await?;
        let assignment = assignments::fetch_assignment(order.id, porter_id, &mut tx)
            .await?
            .ok_or_else(|| SqliteDatabaseError::AssignmentNotFound {
                order_id: oid.clone(),
                porter_id: porter_id.clone(),
            })?;

        // Expiry is checked first and always wins, even when another porter has already accepted.
        let deadline_passed = assignment.expires_at.map(|t| t < now).unwrap_or(false);
        if assignment.status == AssignmentStatus::Expired ||
            (deadline_passed && assignment.status != AssignmentStatus::Accepted)
        {
            if assignment.status == AssignmentStatus::Offered {
                assignments::mark_expired(assignment.id, now, &mut tx).await?;
                let payload = json!({ "previous": { "status": assignment.status }, "new": { "status": AssignmentStatus::Expired } });
                order_events::append_event(order.id, "offer_expired", &payload, actor, None, correlation_id, now, &mut tx)
                    .await?;
                let event = DomainEvent::new(
                    correlation_id.clone(),
                    order.version,
                    EventPayload::PorterOfferExpired { order_id: oid.clone(), porter_id: porter_id.clone() },
                );
                outbox::enqueue(&event, now, &mut tx).await?;
                tx.commit().await?;
            }
            return Err(SqliteDatabaseError::OfferExpired { order_id: oid.clone(), porter_id: porter_id.clone() });
        }

        if assignment.status == AssignmentStatus::Accepted {
            // The porter retried an acceptance that already won. Nothing changed, so nothing is recorded.
            return Ok(AcceptOutcome { order, assignment, revoked: Vec::new(), events: Vec::new() });
        }

        if let Some(winner) = assignments::accepted_porter(order.id, &mut tx).await? {
            if &winner != porter_id {
                return Err(SqliteDatabaseError::OfferAlreadyAccepted { order_id: oid.clone(), accepted_by: winner });
            }
        }
        if matches!(assignment.status, AssignmentStatus::Revoked | AssignmentStatus::Rejected) {
            // The offer is no longer open to this porter; from their side it is indistinguishable from expiry.
            return Err(SqliteDatabaseError::OfferExpired { order_id: oid.clone(), porter_id: porter_id.clone() });
        }

        assignments::mark_accepted(assignment.id, now, &mut tx).await?;
        let revoked = assignments::revoke_other_offers(order.id, porter_id, now, &mut tx).await?;
        orders::mark_accepted(order.id, now, &mut tx).await?;
        let after = Self::require_order(oid, &mut tx).await?;
        let payload = json!({
            "previous": { "status": order.status, "assignment_status": assignment.status },
            "new": { "status": OrderStatus::Accepted, "porter_id": porter_id, "revoked": revoked },
        });
        order_events::append_event(order.id, "offer_accepted", &payload, actor, None, correlation_id, now, &mut tx)
            .await?;
        let events = vec![
            DomainEvent::new(
                correlation_id.clone(),
                after.version,
                EventPayload::OrderAssigned { order_id: oid.clone(), porter_ids: vec![porter_id.clone()] },
            ),
            DomainEvent::new(
                correlation_id.clone(),
                after.version,
                EventPayload::OrderStatusChanged {
                    order_id: oid.clone(),
                    previous: order.status,
                    new: OrderStatus::Accepted,
                },
            ),
        ];
        for event in &events {
            outbox::enqueue(event, now, &mut tx).await?;
        }
        tx.commit().await?;
        let accepted = assignments::fetch_assignment(after.id, porter_id, &mut *self.pool.acquire().await?)
            .await?
            .ok_or_else(|| SqliteDatabaseError::AssignmentNotFound {
                order_id: oid.clone(),
                porter_id: porter_id.clone(),
            })?;
        debug!("🗃️ Porter {porter_id} accepted order {oid}. {} open offers revoked", revoked.len());
        Ok(AcceptOutcome { order: after, assignment: accepted, revoked, events })
    }

    async fn reject_offer(
        &self,
        oid: &OrderId,
        porter_id: &PorterId,
        reason: Option<String>,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<AssignmentOutcome, Self::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let order = Self::require_order(oid, &mut tx).await?;
        let assignment = assignments::fetch_assignment(order.id, porter_id, &mut tx)
            .await?
            .ok_or_else(|| SqliteDatabaseError::AssignmentNotFound {
                order_id: oid.clone(),
                porter_id: porter_id.clone(),
            })?;
        // Only an open offer can be declined. An accepted assignment stays accepted; anything else is already
        // closed out.
        match assignment.status {
            AssignmentStatus::Offered | AssignmentStatus::Tentative => {},
            AssignmentStatus::Accepted => {
                return Err(SqliteDatabaseError::OfferAlreadyAccepted {
                    order_id: oid.clone(),
                    accepted_by: porter_id.clone(),
                })
            },
            _ => {
                return Err(SqliteDatabaseError::OfferExpired { order_id: oid.clone(), porter_id: porter_id.clone() })
            },
        }
        assignments::mark_rejected(assignment.id, reason.as_deref(), now, &mut tx).await?;
        let payload = json!({
            "previous": { "assignment_status": assignment.status },
            "new": { "assignment_status": AssignmentStatus::Rejected, "reason": reason },
        });
        order_events::append_event(order.id, "offer_rejected", &payload, actor, None, correlation_id, now, &mut tx)
            .await?;
        tx.commit().await?;
        let rejected = assignments::fetch_assignment(order.id, porter_id, &mut *self.pool.acquire().await?)
            .await?
            .ok_or_else(|| SqliteDatabaseError::AssignmentNotFound {
                order_id: oid.clone(),
                porter_id: porter_id.clone(),
            })?;
        Ok(AssignmentOutcome { order, assignments: vec![rejected], events: Vec::new() })
    }

    async fn update_stop_status(
        &self,
        oid: &OrderId,
        stop_id: i64,
        new_status: StopStatus,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<StopOutcome, Self::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let order = Self::require_order(oid, &mut tx).await?;
        let stop = stops::fetch_stop(order.id, stop_id, &mut tx)
            .await?
            .ok_or_else(|| SqliteDatabaseError::StopNotFound { order_id: oid.clone(), stop_id })?;
        stops::set_stop_status(stop.id, new_status, now, &mut tx).await?;
        orders::bump_version(order.id, now, &mut tx).await?;
        let after = Self::require_order(oid, &mut tx).await?;
        let payload = json!({
            "previous": { "stop_status": stop.status },
            "new": { "stop_status": new_status, "stop_id": stop.id, "sequence": stop.sequence },
        });
        order_events::append_event(
            order.id,
            "waypoint_status_changed",
            &payload,
            actor,
            None,
            correlation_id,
            now,
            &mut tx,
        )
        .await?;
        let event = DomainEvent::new(
            correlation_id.clone(),
            after.version,
            EventPayload::WaypointStatusChanged {
                order_id: oid.clone(),
                stop_id: stop.id,
                sequence: stop.sequence,
                previous: stop.status,
                new: new_status,
            },
        );
        outbox::enqueue(&event, now, &mut tx).await?;
        tx.commit().await?;
        let updated = stops::fetch_stop(order.id, stop_id, &mut *self.pool.acquire().await?)
            .await?
            .ok_or_else(|| SqliteDatabaseError::StopNotFound { order_id: oid.clone(), stop_id })?;
        Ok(StopOutcome { order: after, stop: updated, events: vec![event] })
    }

    async fn insert_evidence(
        &self,
        oid: &OrderId,
        evidence: NewEvidence,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<EvidenceOutcome, Self::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let order = Self::require_order(oid, &mut tx).await?;
        let saved = evidence_queries::insert_evidence(order.id, &evidence, now, &mut tx).await?;
        let payload = json!({
            "new": { "evidence_id": saved.id, "evidence_type": saved.evidence_type, "url": saved.url },
        });
        order_events::append_event(order.id, "evidence_uploaded", &payload, actor, None, correlation_id, now, &mut tx)
            .await?;
        let event = DomainEvent::new(
            correlation_id.clone(),
            order.version,
            EventPayload::EvidenceUploaded {
                order_id: oid.clone(),
                evidence_id: saved.id,
                evidence_type: saved.evidence_type.clone(),
                url: saved.url.clone(),
            },
        );
        outbox::enqueue(&event, now, &mut tx).await?;
        tx.commit().await?;
        Ok(EvidenceOutcome { order, evidence: saved, events: vec![event] })
    }

    async fn set_dispute(
        &self,
        oid: &OrderId,
        expected_version: i64,
        disputed: bool,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<MutationOutcome, Self::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let before = Self::require_order(oid, &mut tx).await?;
        if !orders::set_dispute_with_version(before.id, expected_version, disputed, now, &mut tx).await? {
            return Err(SqliteDatabaseError::VersionConflict(oid.clone()));
        }
        let after = Self::require_order(oid, &mut tx).await?;
        let payload = json!({ "previous": { "disputed": before.disputed }, "new": { "disputed": disputed } });
        let event_type = if disputed { "dispute_raised" } else { "dispute_resolved" };
        order_events::append_event(before.id, event_type, &payload, actor, None, correlation_id, now, &mut tx).await?;
        let event = DomainEvent::new(
            correlation_id.clone(),
            after.version,
            EventPayload::OrderUpdated { order_id: oid.clone(), changed_fields: vec!["disputed".to_string()] },
        );
        outbox::enqueue(&event, now, &mut tx).await?;
        tx.commit().await?;
        Ok(MutationOutcome { order: after, events: vec![event] })
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.pool.close().await;
        Ok(())
    }
}

impl OrderManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn order_by_id(&self, oid: &OrderId) -> Result<Option<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(oid, &mut conn).await
    }

    async fn order_detail(&self, oid: &OrderId) -> Result<Option<OrderDetail>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let order = match orders::fetch_order(oid, &mut conn).await? {
            Some(order) => order,
            None => return Ok(None),
        };
        let stops = stops::fetch_stops(order.id, &mut conn).await?;
        let items = items::fetch_items(order.id, &mut conn).await?;
        let assignments = assignments::fetch_assignments(order.id, &mut conn).await?;
        let evidence = evidence_queries::fetch_evidence(order.id, &mut conn).await?;
        Ok(Some(OrderDetail { order, stops, items, assignments, evidence }))
    }

    async fn search_orders(&self, filter: OrderQueryFilter) -> Result<(Vec<Order>, i64), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::search_orders(&filter, &mut conn).await
    }

    async fn assignment(&self, oid: &OrderId, porter_id: &PorterId) -> Result<Option<OrderAssignment>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let order = match orders::fetch_order(oid, &mut conn).await? {
            Some(order) => order,
            None => return Ok(None),
        };
        assignments::fetch_assignment(order.id, porter_id, &mut conn).await
    }

    async fn audit_trail(&self, oid: &OrderId, limit: i64) -> Result<Vec<OrderEvent>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let order = Self::require_order(oid, &mut conn).await?;
        order_events::fetch_events(order.id, limit, &mut conn).await
    }

    async fn statistics(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<DispatchStats, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
                SELECT status, COUNT(*) FROM orders
                WHERE created_at >= $1 AND created_at <= $2 GROUP BY status ORDER BY status
            "#,
        )
        .bind(since)
        .bind(until)
        .fetch_all(&mut *conn)
        .await?;
        let by_status = rows
            .into_iter()
            .map(|(status, count)| StatusCount { status: OrderStatus::from(status), count })
            .collect::<Vec<_>>();
        let total_orders = by_status.iter().map(|s| s.count).sum();
        let booked_revenue = sqlx::query_scalar::<_, i64>(
            r#"
                SELECT COALESCE(SUM(price), 0) FROM orders
                WHERE created_at >= $1 AND created_at <= $2 AND status IN ('COMPLETED', 'CLOSED')
            "#,
        )
        .bind(since)
        .bind(until)
        .fetch_one(&mut *conn)
        .await?;
        let cancellation_fees = sqlx::query_scalar::<_, i64>(
            r#"
                SELECT COALESCE(SUM(cancellation_fee), 0) FROM orders
                WHERE created_at >= $1 AND created_at <= $2 AND status = 'CANCELLED'
            "#,
        )
        .bind(since)
        .bind(until)
        .fetch_one(&mut *conn)
        .await?;
        Ok(DispatchStats {
            total_orders,
            by_status,
            booked_revenue: MoneyCents::from(booked_revenue),
            cancellation_fees: MoneyCents::from(cancellation_fees),
        })
    }
}

impl IdempotencyStore for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn idempotency_record(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyRecord>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        idempotency::fetch_record(key, now, &mut conn).await
    }

    async fn store_idempotency_record(
        &self,
        key: &str,
        outcome: &str,
        input_hash: &str,
        ttl: Duration,
    ) -> Result<(), Self::Error> {
        let now = Utc::now();
        let expires_at = now +
            chrono::Duration::from_std(ttl)
                .map_err(|e| SqliteDatabaseError::QueryError(format!("Idempotency TTL out of range: {e}")))?;
        let mut conn = self.pool.acquire().await?;
        idempotency::store_record(key, outcome, input_hash, now, expires_at, &mut conn).await
    }

    async fn purge_idempotency_records(&self, now: DateTime<Utc>) -> Result<u64, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        idempotency::purge_expired(now, &mut conn).await
    }
}

impl OutboxManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn unpublished_events(&self, limit: i64) -> Result<Vec<OutboxRow>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        outbox::fetch_unpublished(limit, &mut conn).await
    }

    async fn mark_published(&self, ids: &[i64]) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        outbox::mark_published(ids, Utc::now(), &mut conn).await
    }
}
