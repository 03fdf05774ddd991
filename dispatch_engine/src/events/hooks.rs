use std::{future::Future, pin::Pin, sync::Arc};

use chrono::{DateTime, Utc};

use crate::{
    db_types::{OrderId, OrderStatus, PorterId},
    events::{EventHandler, EventProducer, Handler},
};

/// Fired once per porter when an offer goes out. The notification service subscribes to this to push the offer to
/// the porter's device.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferNotification {
    pub order_id: OrderId,
    pub porter_id: PorterId,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Fired after any committed order status change.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChangeNotice {
    pub order_id: OrderId,
    pub previous: OrderStatus,
    pub current: OrderStatus,
}

#[derive(Default, Clone)]
pub struct EventProducers {
    pub offer_producers: Vec<EventProducer<OfferNotification>>,
    pub status_producers: Vec<EventProducer<StatusChangeNotice>>,
}

pub struct EventHandlers {
    pub on_porter_offered: Option<EventHandler<OfferNotification>>,
    pub on_status_changed: Option<EventHandler<StatusChangeNotice>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_porter_offered = hooks.on_porter_offered.map(|f| EventHandler::new(buffer_size, f));
        let on_status_changed = hooks.on_status_changed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_porter_offered, on_status_changed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_porter_offered {
            result.offer_producers.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_status_changed {
            result.status_producers.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_porter_offered {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_status_changed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_porter_offered: Option<Handler<OfferNotification>>,
    pub on_status_changed: Option<Handler<StatusChangeNotice>>,
}

impl EventHooks {
    pub fn on_porter_offered<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OfferNotification) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_porter_offered = Some(Arc::new(f));
        self
    }

    pub fn on_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(StatusChangeNotice) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_status_changed = Some(Arc::new(f));
        self
    }
}
