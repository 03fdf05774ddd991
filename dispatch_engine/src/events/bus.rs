use std::{future::Future, sync::Arc};

use log::*;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Error)]
#[error("Message bus publish failed: {0}")]
pub struct BusError(pub String);

/// The contract the engine expects from the external message bus. The engine only ever writes; delivery guarantees
/// beyond at-least-once are the bus's problem.
///
/// `publish` returns an explicitly `Send` future so the relay worker holding the bus can run on a spawned task.
pub trait MessageBus: Clone + Send + Sync {
    fn publish(&self, topic: &str, key: &str, payload: &str) -> impl Future<Output = Result<(), BusError>> + Send;
}

/// A bus that just logs every publish. Useful as a stand-in when no broker is wired up.
#[derive(Debug, Clone, Default)]
pub struct LogBus;

impl MessageBus for LogBus {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), BusError> {
        info!("🚌️ [{topic}] key={key} {payload}");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub payload: String,
}

/// An in-memory capture bus for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    messages: Arc<Mutex<Vec<PublishedMessage>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<PublishedMessage> {
        self.messages.lock().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.messages.lock().await.len()
    }
}

impl MessageBus for MemoryBus {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), BusError> {
        let mut messages = self.messages.lock().await;
        messages.push(PublishedMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }
}
