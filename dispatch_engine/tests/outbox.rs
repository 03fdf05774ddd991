mod support;

use std::time::Duration;

use dispatch_engine::{
    db_types::{CorrelationId, PorterId, Requester},
    dispatch_api::order_objects::AssignPortersRequest,
    events::{relay_once, start_outbox_relay, MemoryBus},
    OutboxManagement,
};
use support::{basic_order_request, new_api, porters};

#[tokio::test]
async fn the_relay_drains_the_outbox_to_the_bus() {
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let dispatcher = Requester::admin("ops-1");
    let corr = CorrelationId::from("corr-outbox");

    let created = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();
    api.assign_porters(&created.order_id, AssignPortersRequest::offer(porters(2), 5), &dispatcher, None, &corr)
        .await
        .unwrap();
    api.accept_offer(&created.order_id, &PorterId::from("porter-1"), &Requester::porter("porter-1"), None, &corr)
        .await
        .unwrap();

    let db = api.db();
    let pending = db.unpublished_events(100).await.unwrap();
    assert!(!pending.is_empty());

    let bus = MemoryBus::new();
    let delivered = relay_once(db, &bus, 100).await.unwrap();
    assert_eq!(delivered, pending.len());

    let messages = bus.messages().await;
    let topics = messages.iter().map(|m| m.topic.as_str()).collect::<Vec<_>>();
    assert!(topics.contains(&"orders.created"));
    assert!(topics.contains(&"porters.offered"));
    assert!(topics.contains(&"orders.assigned"));
    assert!(topics.contains(&"orders.status_changed"));

    // A drained outbox stays drained.
    assert!(db.unpublished_events(100).await.unwrap().is_empty());
    assert_eq!(relay_once(db, &bus, 100).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn the_relay_worker_publishes_in_the_background() {
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let corr = CorrelationId::from("corr-worker");

    let bus = MemoryBus::new();
    let worker = start_outbox_relay(api.db().clone(), bus.clone(), Duration::from_millis(20), 100);

    api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();

    let mut delivered = Vec::new();
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        delivered = bus.messages().await;
        if !delivered.is_empty() {
            break;
        }
    }
    worker.abort();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].topic, "orders.created");
    assert!(api.db().unpublished_events(100).await.unwrap().is_empty());
}

#[tokio::test]
async fn every_envelope_carries_its_metadata() {
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let corr = CorrelationId::from("corr-envelope");

    let created = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();

    let bus = MemoryBus::new();
    relay_once(api.db(), &bus, 100).await.unwrap();
    let messages = bus.messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].key, created.order_id.0);

    let envelope: serde_json::Value = serde_json::from_str(&messages[0].payload).unwrap();
    assert!(!envelope["event_id"].as_str().unwrap().is_empty());
    assert!(!envelope["timestamp"].as_str().unwrap().is_empty());
    assert_eq!(envelope["correlation_id"], "corr-envelope");
    assert_eq!(envelope["version"], 1);
    assert_eq!(envelope["type"], "order_created");
}
