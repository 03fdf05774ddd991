mod bus;
mod channel;
mod event_types;
mod hooks;
mod relay;

pub use bus::{BusError, LogBus, MemoryBus, MessageBus, PublishedMessage};
pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers, OfferNotification, StatusChangeNotice};
pub use relay::{relay_once, start_outbox_relay};
