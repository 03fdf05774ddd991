mod support;

use dispatch_engine::{
    db_types::{CorrelationId, OrderStatus, OrderUpdate, Requester},
    dispatch_api::order_objects::ChangeStatusRequest,
    DispatchDatabase,
    OrderFlowError,
};
use support::{basic_order_request, new_api};

#[tokio::test]
async fn a_pinned_version_fails_fast_when_stale() {
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let dispatcher = Requester::admin("ops-1");
    let corr = CorrelationId::from("corr-stale");

    let created = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();
    // Another writer bumps the version from 1 to 2.
    let update = OrderUpdate::default().with_instructions("Use the service lift");
    api.update_order(&created.order_id, update, &customer, None, &corr).await.unwrap();

    let req = ChangeStatusRequest::to(OrderStatus::Assigned).expecting_version(1);
    let err = api.change_status(&created.order_id, req, &dispatcher, None, &corr).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Concurrency(_)));
}

#[tokio::test]
async fn unpinned_writes_read_the_current_version() {
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let dispatcher = Requester::admin("ops-1");
    let corr = CorrelationId::from("corr-fresh");

    let created = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();
    let update = OrderUpdate::default().with_instructions("Use the service lift");
    api.update_order(&created.order_id, update, &customer, None, &corr).await.unwrap();

    let result = api
        .change_status(&created.order_id, ChangeStatusRequest::to(OrderStatus::Assigned), &dispatcher, None, &corr)
        .await
        .unwrap();
    assert_eq!(result.status, OrderStatus::Assigned);
    assert_eq!(result.version, 3);
}

#[tokio::test]
async fn two_writers_with_the_same_snapshot_cannot_both_commit() {
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let corr = CorrelationId::from("corr-dual");

    let created = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();
    let db = api.db();
    let actor = Requester::customer("cust-1");

    let first = OrderUpdate::default().with_instructions("First writer");
    db.update_order(&created.order_id, 1, first, &actor, &corr).await.unwrap();

    let second = OrderUpdate::default().with_instructions("Second writer");
    let err = db.update_order(&created.order_id, 1, second, &actor, &corr).await.unwrap_err();
    let flow: OrderFlowError = err.into();
    assert!(matches!(flow, OrderFlowError::Concurrency(_)));
}

#[tokio::test]
async fn every_committed_write_bumps_the_version() {
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let corr = CorrelationId::from("corr-version");

    let created = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();
    let v1 = api.order(&created.order_id, &customer).await.unwrap().order.version;
    assert_eq!(v1, 1);

    let update = OrderUpdate::default().with_porters_requested(3);
    let updated = api.update_order(&created.order_id, update, &customer, None, &corr).await.unwrap();
    assert_eq!(updated.version, 2);

    let cancelled = api.cancel_order(&created.order_id, "done testing", &customer, None, &corr).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    let after = api.order(&created.order_id, &customer).await.unwrap().order;
    assert_eq!(after.version, 3);
}
