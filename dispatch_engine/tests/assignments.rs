mod support;

use std::time::Duration;

use dispatch_engine::{
    db_types::{AssignmentStatus, CorrelationId, OrderStatus, PorterId, Requester},
    dispatch_api::order_objects::AssignPortersRequest,
    OrderFlowError,
};
use support::{basic_order_request, new_api, porters};

#[tokio::test]
async fn the_first_committed_acceptance_wins() {
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let dispatcher = Requester::admin("ops-1");
    let corr = CorrelationId::from("corr-race");

    let created = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();
    api.assign_porters(&created.order_id, AssignPortersRequest::offer(porters(3), 5), &dispatcher, None, &corr)
        .await
        .unwrap();

    let winner = api
        .accept_offer(&created.order_id, &PorterId::from("porter-1"), &Requester::porter("porter-1"), None, &corr)
        .await
        .unwrap();
    assert_eq!(winner.status, AssignmentStatus::Accepted);

    // The loser finds the order already taken, no matter that their own offer was revoked moments ago.
    let err = api
        .accept_offer(&created.order_id, &PorterId::from("porter-2"), &Requester::porter("porter-2"), None, &corr)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderFlowError::OfferAlreadyAccepted { ref accepted_by, .. } if *accepted_by == PorterId::from("porter-1")));

    // The winner retrying is a harmless no-op.
    let again = api
        .accept_offer(&created.order_id, &PorterId::from("porter-1"), &Requester::porter("porter-1"), None, &corr)
        .await
        .unwrap();
    assert_eq!(again.status, AssignmentStatus::Accepted);
    assert!(again.revoked.is_empty());

    let detail = api.order(&created.order_id, &dispatcher).await.unwrap();
    assert_eq!(detail.order.status, OrderStatus::Accepted);
    assert_eq!(detail.order.porters_assigned, 1);
    let revoked = detail
        .assignments
        .iter()
        .filter(|a| a.status == AssignmentStatus::Revoked)
        .count();
    assert_eq!(revoked, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_acceptances_produce_exactly_one_winner() {
    let api = std::sync::Arc::new(new_api().await);
    let customer = Requester::customer("cust-1");
    let dispatcher = Requester::admin("ops-1");
    let corr = CorrelationId::from("corr-burst");

    let created = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();
    api.assign_porters(&created.order_id, AssignPortersRequest::offer(porters(4), 5), &dispatcher, None, &corr)
        .await
        .unwrap();

    let mut handles = Vec::with_capacity(4);
    for i in 1..=4 {
        let api = api.clone();
        let oid = created.order_id.clone();
        let corr = corr.clone();
        handles.push(tokio::spawn(async move {
            let porter = PorterId::from(format!("porter-{i}"));
            let requester = Requester::porter(format!("porter-{i}"));
            api.accept_offer(&oid, &porter, &requester, None, &corr).await
        }));
    }

    let mut winners = 0;
    let mut already_taken = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(result) => {
                assert_eq!(result.status, AssignmentStatus::Accepted);
                winners += 1;
            },
            Err(OrderFlowError::OfferAlreadyAccepted { .. }) => already_taken += 1,
            Err(other) => panic!("unexpected acceptance failure: {other:?}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(already_taken, 3);

    let detail = api.order(&created.order_id, &dispatcher).await.unwrap();
    assert_eq!(detail.order.porters_assigned, 1);
    assert_eq!(detail.assignments.iter().filter(|a| a.status == AssignmentStatus::Accepted).count(), 1);
}

#[tokio::test]
async fn offers_expire_lazily_at_the_moment_of_acceptance() {
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let dispatcher = Requester::admin("ops-1");
    let corr = CorrelationId::from("corr-expiry");

    let created = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();
    api.assign_porters(&created.order_id, AssignPortersRequest::offer(porters(2), 0), &dispatcher, None, &corr)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = api
        .accept_offer(&created.order_id, &PorterId::from("porter-1"), &Requester::porter("porter-1"), None, &corr)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderFlowError::OfferExpired { .. }));

    // Only the offer that was touched has been marked. There is no background sweeper.
    let detail = api.order(&created.order_id, &dispatcher).await.unwrap();
    let p1 = detail.assignments.iter().find(|a| a.porter_id == PorterId::from("porter-1")).unwrap();
    let p2 = detail.assignments.iter().find(|a| a.porter_id == PorterId::from("porter-2")).unwrap();
    assert_eq!(p1.status, AssignmentStatus::Expired);
    assert_eq!(p2.status, AssignmentStatus::Offered);
    assert_eq!(detail.order.status, OrderStatus::TentativelyAssigned);
}

#[tokio::test]
async fn a_rejected_offer_leaves_the_others_open() {
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let dispatcher = Requester::admin("ops-1");
    let corr = CorrelationId::from("corr-reject");

    let created = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();
    api.assign_porters(&created.order_id, AssignPortersRequest::offer(porters(2), 5), &dispatcher, None, &corr)
        .await
        .unwrap();

    let rejected = api
        .reject_offer(
            &created.order_id,
            &PorterId::from("porter-1"),
            Some("Van too small".to_string()),
            &Requester::porter("porter-1"),
            None,
            &corr,
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, AssignmentStatus::Rejected);

    let detail = api.order(&created.order_id, &dispatcher).await.unwrap();
    let p1 = detail.assignments.iter().find(|a| a.porter_id == PorterId::from("porter-1")).unwrap();
    assert_eq!(p1.reject_reason.as_deref(), Some("Van too small"));
    let p2 = detail.assignments.iter().find(|a| a.porter_id == PorterId::from("porter-2")).unwrap();
    assert_eq!(p2.status, AssignmentStatus::Offered);
    assert_eq!(detail.order.status, OrderStatus::TentativelyAssigned);

    // Accepting after rejecting is not a thing.
    let err = api
        .accept_offer(&created.order_id, &PorterId::from("porter-1"), &Requester::porter("porter-1"), None, &corr)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderFlowError::OfferExpired { .. }));
}

#[tokio::test]
async fn an_accepted_assignment_cannot_be_rejected() {
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let dispatcher = Requester::admin("ops-1");
    let corr = CorrelationId::from("corr-reject-late");

    let created = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();
    api.assign_porters(&created.order_id, AssignPortersRequest::offer(porters(2), 5), &dispatcher, None, &corr)
        .await
        .unwrap();
    api.accept_offer(&created.order_id, &PorterId::from("porter-1"), &Requester::porter("porter-1"), None, &corr)
        .await
        .unwrap();

    // The winner changing their mind does not orphan the order.
    let err = api
        .reject_offer(
            &created.order_id,
            &PorterId::from("porter-1"),
            Some("Cold feet".to_string()),
            &Requester::porter("porter-1"),
            None,
            &corr,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrderFlowError::OfferAlreadyAccepted { .. }));

    // Nor can a revoked loser reject after the fact.
    let err = api
        .reject_offer(
            &created.order_id,
            &PorterId::from("porter-2"),
            None,
            &Requester::porter("porter-2"),
            None,
            &corr,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrderFlowError::OfferExpired { .. }));

    let detail = api.order(&created.order_id, &dispatcher).await.unwrap();
    assert_eq!(detail.order.status, OrderStatus::Accepted);
    let accepted = detail.assignments.iter().filter(|a| a.status == AssignmentStatus::Accepted).count();
    assert_eq!(accepted, 1);
}

#[tokio::test]
async fn direct_assignment_skips_the_offer_dance() {
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let dispatcher = Requester::admin("ops-1");
    let corr = CorrelationId::from("corr-direct");

    let created = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();
    let result = api
        .assign_porters(&created.order_id, AssignPortersRequest::direct(porters(2), true), &dispatcher, None, &corr)
        .await
        .unwrap();
    assert_eq!(result.status, OrderStatus::Assigned);
    assert!(result.assignments.iter().all(|a| a.status == AssignmentStatus::Accepted && a.expires_at.is_none()));

    let detail = api.order(&created.order_id, &dispatcher).await.unwrap();
    assert_eq!(detail.order.porters_assigned, 2);
}

#[tokio::test]
async fn the_same_porter_cannot_be_offered_twice() {
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let dispatcher = Requester::admin("ops-1");
    let corr = CorrelationId::from("corr-dup");

    let created = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();
    api.assign_porters(&created.order_id, AssignPortersRequest::offer(porters(1), 5), &dispatcher, None, &corr)
        .await
        .unwrap();
    let err = api
        .assign_porters(&created.order_id, AssignPortersRequest::offer(porters(1), 5), &dispatcher, None, &corr)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderFlowError::Validation(_)));
}

#[tokio::test]
async fn porters_cannot_answer_for_each_other() {
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let dispatcher = Requester::admin("ops-1");
    let corr = CorrelationId::from("corr-imposter");

    let created = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();
    api.assign_porters(&created.order_id, AssignPortersRequest::offer(porters(2), 5), &dispatcher, None, &corr)
        .await
        .unwrap();

    let err = api
        .accept_offer(&created.order_id, &PorterId::from("porter-1"), &Requester::porter("porter-2"), None, &corr)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderFlowError::Forbidden(_)));

    // Admins can, on a porter's behalf.
    let accepted = api
        .accept_offer(&created.order_id, &PorterId::from("porter-1"), &Requester::admin("ops-1"), None, &corr)
        .await
        .unwrap();
    assert_eq!(accepted.status, AssignmentStatus::Accepted);
}

#[tokio::test]
async fn customers_cannot_assign_porters() {
    let api = new_api().await;
    let customer = Requester::customer("cust-1");
    let corr = CorrelationId::from("corr-role");

    let created = api.create_order(basic_order_request("cust-1"), &customer, None, &corr).await.unwrap();
    let err = api
        .assign_porters(&created.order_id, AssignPortersRequest::offer(porters(1), 5), &customer, None, &corr)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderFlowError::Forbidden(_)));
}
