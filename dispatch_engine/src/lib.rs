//! Porter Dispatch Engine
//!
//! The dispatch engine is the core of a logistics marketplace: it owns the lifecycle of a transport order from
//! creation to closure, and the matching of that order to mobile workers ("porters") through a time-bounded offer
//! protocol.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@db`]). SQLite is the bundled backend. You should never need to access
//!    the database directly; use the public API instead. The exception is the data types used in the database,
//!    which are defined in the `db_types` module and are public.
//! 2. The public API ([`mod@dispatch_api`]). [`OrderFlowApi`] carries every client-facing operation: order
//!    creation, editing, cancellation, status changes, the porter offer/accept protocol, waypoint tracking,
//!    evidence, admin overrides and reporting. Specific backends need to implement the traits in [`mod@db`] to act
//!    as storage for the engine.
//!
//! Every committed state change writes one audit ledger row and its domain events to a transactional outbox in the
//! same transaction; a background relay ([`events::start_outbox_relay`]) delivers the events to a message bus with
//! at-least-once semantics. In-process consumers can also subscribe to typed hooks through a small actor framework
//! in [`mod@events`].
mod db;

pub mod config;
pub mod db_types;
pub mod dispatch_api;
pub mod events;
pub mod helpers;
pub mod transitions;

#[cfg(feature = "sqlite")]
pub use db::sqlite::{SqliteDatabase, SqliteDatabaseError};
pub use db::traits::{
    AcceptOutcome,
    AssignmentOutcome,
    AssignmentPlan,
    AuditTrail,
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
};
pub use dispatch_api::{order_objects, BiddingStrategy, OrderFlowApi, OrderFlowError, PricingEngine};
