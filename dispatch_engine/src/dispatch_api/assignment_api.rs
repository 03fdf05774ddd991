use std::time::Duration;

use chrono::Utc;
use log::*;

use crate::{
    db::traits::AssignmentPlan,
    db_types::{AssignmentStatus, Order, OrderStatus, PorterId},
    dispatch_api::{
        order_objects::{AssignPortersRequest, AssignmentStrategy},
        OrderFlowError,
    },
};

/// Porter selection and scoring for the `bidding` strategy. The actual scoring lives outside this core; all the
/// engine needs back is a ranked candidate list.
pub trait BiddingStrategy: Send + Sync {
    fn rank(&self, order: &Order, candidates: &[PorterId]) -> Vec<PorterId>;
}

/// Turns an assignment request into the storage-level plan.
///
/// * `direct` attaches the given porters immediately: accepted when `auto_assign` is set, tentative otherwise.
///   No deadline in either case.
/// * `offer` creates one open offer per porter sharing a single deadline; the order moves to tentatively assigned
///   until somebody accepts.
/// * `bidding` asks the configured strategy to rank the candidates, then offers to the top
///   `porters_requested` of them.
pub fn build_plan(
    order: &Order,
    req: &AssignPortersRequest,
    default_offer_expiry: Duration,
    bidding: Option<&dyn BiddingStrategy>,
) -> Result<AssignmentPlan, OrderFlowError> {
    if req.porter_ids.is_empty() {
        return Err(OrderFlowError::Validation("At least one porter is required".to_string()));
    }
    let offer_deadline = || {
        let expiry = req
            .offer_expiry_minutes
            .map(|mins| Duration::from_secs(mins.max(0) as u64 * 60))
            .unwrap_or(default_offer_expiry);
        chrono::Duration::from_std(expiry).ok().map(|d| Utc::now() + d)
    };
    let plan = match req.strategy {
        AssignmentStrategy::Direct => {
            let assignment_status =
                if req.auto_assign { AssignmentStatus::Accepted } else { AssignmentStatus::Tentative };
            let order_status =
                if req.auto_assign { OrderStatus::Assigned } else { OrderStatus::TentativelyAssigned };
            AssignmentPlan {
                porters: req.porter_ids.clone(),
                assignment_status,
                expires_at: None,
                order_status,
                earnings: req.earnings,
            }
        },
        AssignmentStrategy::Offer => AssignmentPlan {
            porters: req.porter_ids.clone(),
            assignment_status: AssignmentStatus::Offered,
            expires_at: offer_deadline(),
            order_status: OrderStatus::TentativelyAssigned,
            earnings: req.earnings,
        },
        AssignmentStrategy::Bidding => {
            let strategy = bidding
                .ok_or_else(|| OrderFlowError::Unsupported("Bidding assignments without a strategy".to_string()))?;
            let mut ranked = strategy.rank(order, &req.porter_ids);
            ranked.truncate(order.porters_requested.max(1) as usize);
            if ranked.is_empty() {
                return Err(OrderFlowError::Validation("The bidding strategy returned no candidates".to_string()));
            }
            debug!("⚖️ Bidding strategy ranked {} of {} candidates for order {}", ranked.len(), req.porter_ids.len(), order.order_id);
            AssignmentPlan {
                porters: ranked,
                assignment_status: AssignmentStatus::Offered,
                expires_at: offer_deadline(),
                order_status: OrderStatus::TentativelyAssigned,
                earnings: req.earnings,
            }
        },
    };
    Ok(plan)
}

#[cfg(test)]
mod test {
    use pd_common::MoneyCents;

    use super::*;
    use crate::db_types::VehicleType;

    fn order(porters_requested: i64) -> Order {
        let now = Utc::now();
        Order {
            id: 1,
            order_id: crate::db_types::OrderId::from("ord-test".to_string()),
            customer_id: "cust-1".to_string(),
            status: OrderStatus::Created,
            price: MoneyCents::from(5000),
            currency: "USD".to_string(),
            porters_requested,
            porters_assigned: 0,
            vehicle: VehicleType::Van,
            scheduled_at: None,
            instructions: None,
            version: 1,
            cancelled_at: None,
            cancelled_by: None,
            cancel_reason: None,
            cancellation_fee: None,
            disputed: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn porters(n: usize) -> Vec<PorterId> {
        (1..=n).map(|i| PorterId::from(format!("porter-{i}"))).collect()
    }

    struct ReverseBidding;
    impl BiddingStrategy for ReverseBidding {
        fn rank(&self, _order: &Order, candidates: &[PorterId]) -> Vec<PorterId> {
            let mut ranked = candidates.to_vec();
            ranked.reverse();
            ranked
        }
    }

    #[test]
    fn direct_auto_assign_creates_accepted_assignments() {
        let req = AssignPortersRequest::direct(porters(2), true);
        let plan = build_plan(&order(2), &req, Duration::from_secs(900), None).unwrap();
        assert_eq!(plan.assignment_status, AssignmentStatus::Accepted);
        assert_eq!(plan.order_status, OrderStatus::Assigned);
        assert!(plan.expires_at.is_none());
    }

    #[test]
    fn direct_without_auto_assign_is_tentative() {
        let req = AssignPortersRequest::direct(porters(1), false);
        let plan = build_plan(&order(1), &req, Duration::from_secs(900), None).unwrap();
        assert_eq!(plan.assignment_status, AssignmentStatus::Tentative);
        assert_eq!(plan.order_status, OrderStatus::TentativelyAssigned);
    }

    #[test]
    fn offers_share_a_deadline() {
        let req = AssignPortersRequest::offer(porters(3), 5);
        let before = Utc::now();
        let plan = build_plan(&order(1), &req, Duration::from_secs(900), None).unwrap();
        let deadline = plan.expires_at.unwrap();
        assert!(deadline >= before + chrono::Duration::minutes(5));
        assert!(deadline <= Utc::now() + chrono::Duration::minutes(5));
        assert_eq!(plan.porters.len(), 3);
        assert_eq!(plan.assignment_status, AssignmentStatus::Offered);
    }

    #[test]
    fn bidding_without_a_strategy_fails_fast() {
        let req = AssignPortersRequest::bidding(porters(3), 5);
        let err = build_plan(&order(1), &req, Duration::from_secs(900), None).unwrap_err();
        assert!(matches!(err, OrderFlowError::Unsupported(_)));
    }

    #[test]
    fn bidding_takes_the_top_ranked_candidates() {
        let req = AssignPortersRequest::bidding(porters(3), 5);
        let plan = build_plan(&order(2), &req, Duration::from_secs(900), Some(&ReverseBidding)).unwrap();
        assert_eq!(plan.porters, vec![PorterId::from("porter-3"), PorterId::from("porter-2")]);
    }

    #[test]
    fn empty_porter_list_is_rejected() {
        let req = AssignPortersRequest::offer(Vec::new(), 5);
        let err = build_plan(&order(1), &req, Duration::from_secs(900), None).unwrap_err();
        assert!(matches!(err, OrderFlowError::Validation(_)));
    }
}
