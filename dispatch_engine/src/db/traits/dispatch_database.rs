use chrono::{DateTime, Utc};
use pd_common::MoneyCents;

use crate::{
    db::traits::{AcceptOutcome, AssignmentOutcome, AssignmentPlan, EvidenceOutcome, MutationOutcome, StopOutcome},
    db_types::{
        CorrelationId,
        NewEvidence,
        NewItem,
        NewOrder,
        NewStop,
        OrderId,
        OrderStatus,
        OrderUpdate,
        PorterId,
        Requester,
        StopStatus,
    },
    helpers::geo::GeoPoint,
};

/// The transactional mutation contract for dispatch backends.
///
/// Every method runs inside a single database transaction that commits the state change together with exactly one
/// audit ledger row per change and the outbox rows for the events it produces. Status-change methods take the
/// version the caller read; the write is conditioned on it and a conflict surfaces as the backend's version-conflict
/// error, never as a silent retry.
///
/// Transition validity is the caller's concern (see [`crate::transitions`]). The version gate guarantees the status
/// the caller validated is still the status being replaced.
#[allow(async_fn_in_trait)]
pub trait DispatchDatabase: Clone {
    type Error: std::error::Error;

    /// The URL of the database.
    fn url(&self) -> &str;

    /// Inserts a new order with its stops and items, records the creation audit row and queues `OrderCreated`.
    async fn create_order(
        &self,
        order: NewOrder,
        stops: Vec<NewStop>,
        items: Vec<NewItem>,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<MutationOutcome, Self::Error>;

    /// Applies an [`OrderUpdate`] conditioned on `expected_version`.
    async fn update_order(
        &self,
        oid: &OrderId,
        expected_version: i64,
        update: OrderUpdate,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<MutationOutcome, Self::Error>;

    /// Moves the order to `new_status`, conditioned on `expected_version`. Queues `OrderStatusChanged` and, for
    /// `Completed`, additionally `OrderCompleted`.
    async fn set_order_status(
        &self,
        oid: &OrderId,
        expected_version: i64,
        new_status: OrderStatus,
        location: Option<GeoPoint>,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<MutationOutcome, Self::Error>;

    /// Cancels the order with the given fee breakdown, conditioned on `expected_version`.
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
    ) -> Result<MutationOutcome, Self::Error>;

    /// Creates one assignment per porter in the plan and moves the order to the plan's status, conditioned on
    /// `expected_version`. Queues `PorterOffered` per porter for offers, or `OrderAssigned` for direct assignment.
    async fn assign_porters(
        &self,
        oid: &OrderId,
        expected_version: i64,
        plan: AssignmentPlan,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<AssignmentOutcome, Self::Error>;

    /// The accept-offer race resolution, in one transaction:
    /// * if the offer's deadline has passed at `now`, the assignment is marked `Expired`, a `PorterOfferExpired`
    ///   event is queued, the transaction commits, and the expiry error is returned;
    /// * if another porter already holds the accepted assignment, the already-accepted error is returned;
    /// * otherwise this assignment becomes `Accepted`, every other open offer is `Revoked`, and the order moves to
    ///   `Accepted`.
    async fn accept_offer(
        &self,
        oid: &OrderId,
        porter_id: &PorterId,
        now: DateTime<Utc>,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<AcceptOutcome, Self::Error>;

    /// Marks the porter's assignment `Rejected`. Other offers and the order status are untouched.
    async fn reject_offer(
        &self,
        oid: &OrderId,
        porter_id: &PorterId,
        reason: Option<String>,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<AssignmentOutcome, Self::Error>;

    /// Moves a waypoint to `new_status`, stamping arrival/departure times as appropriate.
    async fn update_stop_status(
        &self,
        oid: &OrderId,
        stop_id: i64,
        new_status: StopStatus,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<StopOutcome, Self::Error>;

    /// Attaches an evidence record (photo, signature, …) to the order.
    async fn insert_evidence(
        &self,
        oid: &OrderId,
        evidence: NewEvidence,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<EvidenceOutcome, Self::Error>;

    /// Raises or clears the dispute flag, conditioned on `expected_version`.
    async fn set_dispute(
        &self,
        oid: &OrderId,
        expected_version: i64,
        disputed: bool,
        actor: &Requester,
        correlation_id: &CorrelationId,
    ) -> Result<MutationOutcome, Self::Error>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
