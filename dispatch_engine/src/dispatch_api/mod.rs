//! The public operations of the dispatch core.
//!
//! [`OrderFlowApi`] is the only entry point clients should use. It composes the storage backend with validation,
//! access checks, idempotent replay, retryable optimistic concurrency and post-commit event hooks. The storage
//! backend does the transactional work; this layer decides whether the work may happen at all.

pub mod assignment_api;
mod errors;
pub mod idempotency;
pub mod order_flow_api;
pub mod order_objects;
pub mod pricing;

pub use assignment_api::BiddingStrategy;
pub use errors::OrderFlowError;
pub use idempotency::StoredOutcome;
pub use order_flow_api::OrderFlowApi;
pub use pricing::{FareComponent, FareQuote, FlatRatePricing, PricingEngine, PricingError};
