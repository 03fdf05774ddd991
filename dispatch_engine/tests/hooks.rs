mod support;

use std::{
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};

use dispatch_engine::{
    db_types::{CorrelationId, OrderStatus, PorterId, Requester},
    dispatch_api::order_objects::AssignPortersRequest,
    events::{EventHandlers, EventHooks},
};
use futures_util::FutureExt;
use log::*;
use support::{basic_order_request, new_api, porters};

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }
}

#[tokio::test]
async fn offer_and_status_hooks_fire_after_commit() {
    let offers = HookCalled::default();
    let statuses = HookCalled::default();
    let offers_copy = offers.clone();
    let statuses_copy = statuses.clone();

    let mut hooks = EventHooks::default();
    hooks.on_porter_offered(move |offer| {
        info!("🪝️ offer for {} to {}", offer.order_id, offer.porter_id);
        offers_copy.called();
        async {}.boxed()
    });
    hooks.on_status_changed(move |notice| {
        info!("🪝️ {} moved {} -> {}", notice.order_id, notice.previous, notice.current);
        statuses_copy.called();
        async {}.boxed()
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let api = new_api().await.with_producers(producers);
    let customer = Requester::customer("cust-1");
    let dispatcher = Requester::admin("ops-1");
    let corr = CorrelationId::from("corr-hooks");

    let created = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();
    api.assign_porters(&created.order_id, AssignPortersRequest::offer(porters(2), 5), &dispatcher, None, &corr)
        .await
        .unwrap();
    api.accept_offer(&created.order_id, &PorterId::from("porter-1"), &Requester::porter("porter-1"), None, &corr)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    // One offer notification per porter; the acceptance is the only status-change event.
    assert_eq!(offers.count(), 2);
    assert_eq!(statuses.count(), 1);

    let detail = api.order(&created.order_id, &dispatcher).await.unwrap();
    assert_eq!(detail.order.status, OrderStatus::Accepted);
}
