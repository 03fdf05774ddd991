//! The interface contracts of the dispatch engine database backends.
//!
//! * [`DispatchDatabase`] defines the transactional mutation flows: every method commits the state change, its audit
//!   ledger row and its outbox rows atomically, or not at all.
//! * [`OrderManagement`] defines the read side: single orders, detail views, filtered listings, the audit trail and
//!   aggregate statistics.
//! * [`IdempotencyStore`] is the shared replay cache for mutating operations.
//! * [`OutboxManagement`] exposes the unpublished-event queue to the relay worker.

mod data_objects;
mod dispatch_database;
mod idempotency_store;
mod order_management;
mod outbox_management;

pub use data_objects::{
    AcceptOutcome,
    AssignmentOutcome,
    AssignmentPlan,
    AuditTrail,
    DispatchStats,
    EvidenceOutcome,
    MutationOutcome,
    OrderDetail,
    OutboxRow,
    StatusCount,
    StopOutcome,
};
pub use dispatch_database::DispatchDatabase;
pub use idempotency_store::IdempotencyStore;
pub use order_management::OrderManagement;
pub use outbox_management::OutboxManagement;
