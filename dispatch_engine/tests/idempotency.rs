mod support;

use dispatch_engine::{
    db_types::{CorrelationId, Requester},
    dispatch_api::order_objects::OrderQueryFilter,
    OrderFlowError,
};
use support::{basic_order_request, new_api};

#[tokio::test]
async fn a_replayed_key_returns_the_original_result() {
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let corr = CorrelationId::from("corr-replay");
    let key = "create-7f3a";

    let first = api.create_order(basic_order_request("cust-1"), &customer, Some(key), &corr).await.unwrap();
    let second = api.create_order(basic_order_request("cust-1"), &customer, Some(key), &corr).await.unwrap();
    assert_eq!(first.order_id, second.order_id);
    assert_eq!(first.created_at, second.created_at);

    let page = api.list_orders(OrderQueryFilter::default(), &customer).await.unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn replay_ignores_a_changed_request_body() {
    // The request hash is stored alongside the outcome but is not compared on replay, so a
    // different body under the same key still returns the first call's result.
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let corr = CorrelationId::from("corr-replay-body");
    let key = "create-9c1d";

    let first = api.create_order(basic_order_request("cust-1"), &customer, Some(key), &corr).await.unwrap();
    let mut changed = basic_order_request("cust-1");
    changed.instructions = Some("Completely different request".to_string());
    let second = api.create_order(changed, &customer, Some(key), &corr).await.unwrap();
    assert_eq!(first.order_id, second.order_id);
}

#[tokio::test]
async fn stored_failures_replay_as_failures() {
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let corr = CorrelationId::from("corr-replay-err");
    let key = "cancel-1b2c";

    let created = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();
    api.cancel_order(&created.order_id, "first", &customer, None, &corr).await.unwrap();

    let err = api.cancel_order(&created.order_id, "second", &customer, Some(key), &corr).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::AlreadyCancelled(_)));

    let replayed = api.cancel_order(&created.order_id, "second", &customer, Some(key), &corr).await.unwrap_err();
    match replayed {
        OrderFlowError::ReplayedFailure { code, .. } => assert_eq!(code, "already_cancelled"),
        other => panic!("expected a replayed failure, got {other:?}"),
    }
}

#[tokio::test]
async fn calls_without_a_key_are_not_deduplicated() {
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let corr = CorrelationId::from("corr-no-key");

    let first = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();
    let second = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();
    assert_ne!(first.order_id, second.order_id);
}
