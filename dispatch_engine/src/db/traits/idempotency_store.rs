use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::db_types::IdempotencyRecord;

/// The shared replay cache for mutating operations. Any engine instance may read or write it; records are immutable
/// until they expire.
#[allow(async_fn_in_trait)]
pub trait IdempotencyStore {
    type Error: std::error::Error;

    /// Fetches the record for `key`, ignoring records that have expired by `now`.
    async fn idempotency_record(&self, key: &str, now: DateTime<Utc>) -> Result<Option<IdempotencyRecord>, Self::Error>;

    /// Stores the outcome of a first execution. A concurrent duplicate insert is not an error; the first writer
    /// wins.
    async fn store_idempotency_record(
        &self,
        key: &str,
        outcome: &str,
        input_hash: &str,
        ttl: Duration,
    ) -> Result<(), Self::Error>;

    /// Deletes expired records, returning how many were removed.
    async fn purge_idempotency_records(&self, now: DateTime<Utc>) -> Result<u64, Self::Error>;
}
