//! The outbox relay.
//!
//! Domain events are written to the `outbox` table in the same transaction as the state change that produced them.
//! This worker drains that table and hands each row to the message bus. A row is only stamped as published after the
//! bus accepts it, so delivery is at-least-once and consumers deduplicate by event id. A crash between commit and
//! relay delays the event; it never loses it.

use std::time::Duration;

use log::*;
use tokio::task::JoinHandle;

use crate::{db::traits::OutboxManagement, events::MessageBus};

/// Relays one batch of unpublished events. Returns how many were published.
pub async fn relay_once<D, B>(db: &D, bus: &B, batch: i64) -> Result<usize, D::Error>
where
    D: OutboxManagement,
    B: MessageBus,
{
    let rows = db.unpublished_events(batch).await?;
    if rows.is_empty() {
        return Ok(0);
    }
    let mut published = Vec::with_capacity(rows.len());
    for row in &rows {
        match bus.publish(&row.topic, &row.bus_key, &row.payload).await {
            Ok(()) => published.push(row.id),
            Err(e) => {
                // Leave the row for the next tick. Publishing in order matters less than not dropping anything.
                warn!("🚌️ Could not publish event {} on [{}]: {e}", row.event_id, row.topic);
            },
        }
    }
    if !published.is_empty() {
        db.mark_published(&published).await?;
    }
    Ok(published.len())
}

/// Starts the relay worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_outbox_relay<D, B>(db: D, bus: B, interval: Duration, batch: i64) -> JoinHandle<()>
where
    D: OutboxManagement + Send + Sync + 'static,
    B: MessageBus + 'static,
{
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🚌️ Outbox relay started");
        loop {
            timer.tick().await;
            match relay_once(&db, &bus, batch).await {
                Ok(0) => trace!("🚌️ Outbox is empty"),
                Ok(n) => debug!("🚌️ Relayed {n} events to the bus"),
                Err(e) => error!("🚌️ Error relaying outbox events: {e}"),
            }
        }
    })
}
