use std::future::Future;

use crate::db::traits::OutboxRow;

/// The relay worker's view of the transactional outbox.
///
/// The methods return `Send` futures explicitly (rather than being plain `async fn`s) so the relay worker can be
/// driven from a spawned task on a multi-threaded runtime.
pub trait OutboxManagement {
    type Error: std::error::Error + Send;

    /// The oldest unpublished rows, up to `limit`.
    fn unpublished_events(&self, limit: i64) -> impl Future<Output = Result<Vec<OutboxRow>, Self::Error>> + Send;

    /// Stamps the given rows as published. Rows already stamped are left alone, so redelivery after a crash is
    /// possible and consumers must deduplicate by event id.
    fn mark_published(&self, ids: &[i64]) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
