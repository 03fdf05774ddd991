//! The order and waypoint state machines.
//!
//! These functions are pure and storage-independent. The orchestration layer calls [`check`] before committing a
//! status change; nothing in the storage layer re-validates, since the optimistic version gate guarantees that the
//! status the validator saw is the status being replaced.

use thiserror::Error;

use crate::db_types::{OrderId, OrderStatus, StopStatus};

#[derive(Debug, Clone, Error)]
#[error("Order {order_id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// The allowed outgoing transitions for each order status. Terminal states return an empty slice.
pub fn allowed_from(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match from {
        Created => &[TentativelyAssigned, Assigned, Cancelled],
        TentativelyAssigned => &[Assigned, Accepted, Cancelled],
        Assigned => &[Accepted, Cancelled],
        Accepted => &[Arrived, Cancelled],
        Arrived => &[Loaded, Cancelled],
        Loaded => &[EnRoute],
        EnRoute => &[Delivered],
        Delivered => &[Completed],
        Completed => &[Closed],
        Closed | Cancelled | Failed => &[],
    }
}

pub fn is_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    allowed_from(from).contains(&to)
}

pub fn is_terminal(status: OrderStatus) -> bool {
    allowed_from(status).is_empty()
}

/// Validates a requested order status change, naming the order and both statuses on failure.
pub fn check(order_id: &OrderId, from: OrderStatus, to: OrderStatus) -> Result<(), TransitionError> {
    if is_allowed(from, to) {
        Ok(())
    } else {
        Err(TransitionError { order_id: order_id.clone(), from, to })
    }
}

/// Waypoint lifecycle: a stop is visited (`Pending` -> `Arrived` -> `Completed`) or skipped outright.
pub fn stop_transition_allowed(from: StopStatus, to: StopStatus) -> bool {
    use StopStatus::*;
    matches!((from, to), (Pending, Arrived) | (Arrived, Completed) | (Pending, Skipped))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::{OrderStatus::*, ALL_ORDER_STATUSES};

    fn table() -> Vec<(OrderStatus, OrderStatus)> {
        vec![
            (Created, TentativelyAssigned),
            (Created, Assigned),
            (Created, Cancelled),
            (TentativelyAssigned, Assigned),
            (TentativelyAssigned, Accepted),
            (TentativelyAssigned, Cancelled),
            (Assigned, Accepted),
            (Assigned, Cancelled),
            (Accepted, Arrived),
            (Accepted, Cancelled),
            (Arrived, Loaded),
            (Arrived, Cancelled),
            (Loaded, EnRoute),
            (EnRoute, Delivered),
            (Delivered, Completed),
            (Completed, Closed),
        ]
    }

    #[test]
    fn full_matrix_matches_table() {
        let table = table();
        for from in ALL_ORDER_STATUSES {
            for to in ALL_ORDER_STATUSES {
                let expected = table.contains(&(from, to));
                assert_eq!(
                    is_allowed(from, to),
                    expected,
                    "transition {from} -> {to} should be {}",
                    if expected { "allowed" } else { "denied" }
                );
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for status in [Closed, Cancelled, Failed] {
            assert!(is_terminal(status));
            for to in ALL_ORDER_STATUSES {
                assert!(!is_allowed(status, to));
            }
        }
        assert!(!is_terminal(Created));
        assert!(!is_terminal(Delivered));
    }

    #[test]
    fn self_transitions_are_denied() {
        for status in ALL_ORDER_STATUSES {
            assert!(!is_allowed(status, status));
        }
    }

    #[test]
    fn check_names_order_and_statuses() {
        let oid = OrderId::from("ord-42".to_string());
        let err = check(&oid, Loaded, Cancelled).unwrap_err();
        assert_eq!(err.from, Loaded);
        assert_eq!(err.to, Cancelled);
        assert!(err.to_string().contains("ord-42"));
    }

    #[test]
    fn stop_lifecycle() {
        use StopStatus::*;
        assert!(stop_transition_allowed(Pending, Arrived));
        assert!(stop_transition_allowed(Arrived, Completed));
        assert!(stop_transition_allowed(Pending, Skipped));
        assert!(!stop_transition_allowed(Pending, Completed));
        assert!(!stop_transition_allowed(Arrived, Skipped));
        assert!(!stop_transition_allowed(Completed, Arrived));
        assert!(!stop_transition_allowed(Skipped, Arrived));
    }
}
