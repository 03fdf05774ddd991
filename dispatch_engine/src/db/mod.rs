//! Storage backends for the dispatch engine.
//!
//! The `traits` module defines the contracts a backend must implement; `sqlite` is the bundled implementation.
//! Application code should never touch the database directly. It goes through [`crate::dispatch_api`] instead, which
//! layers validation, idempotency and event hooks on top of these primitives.

pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;
