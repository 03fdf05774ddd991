//! The cancellation fee schedule.
//!
//! Orders cancelled before a porter has committed are refunded in full. Once a porter has accepted, a 20% fee
//! applies. Fees are computed in integer cents with floor rounding.

use pd_common::MoneyCents;

use crate::db_types::OrderStatus;

const LATE_CANCEL_FEE_PCT: i64 = 20;

/// The fee retained when an order in the given status is cancelled.
pub fn cancellation_fee(status: OrderStatus, price: MoneyCents) -> MoneyCents {
    use OrderStatus::*;
    match status {
        Created | TentativelyAssigned | Assigned => MoneyCents::from(0),
        _ => price.percent(LATE_CANCEL_FEE_PCT),
    }
}

/// The refund owed after the fee has been retained.
pub fn cancellation_refund(status: OrderStatus, price: MoneyCents) -> MoneyCents {
    price - cancellation_fee(status, price)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::OrderStatus::*;

    #[test]
    fn free_cancellation_before_acceptance() {
        let price = MoneyCents::from(5000);
        for status in [Created, TentativelyAssigned, Assigned] {
            assert_eq!(cancellation_fee(status, price).value(), 0);
            assert_eq!(cancellation_refund(status, price).value(), 5000);
        }
    }

    #[test]
    fn late_cancellation_charges_twenty_percent() {
        let price = MoneyCents::from(5000);
        for status in [Accepted, Arrived, Loaded, EnRoute, Delivered] {
            assert_eq!(cancellation_fee(status, price).value(), 1000);
            assert_eq!(cancellation_refund(status, price).value(), 4000);
        }
    }

    #[test]
    fn fee_rounds_down() {
        // 20% of 99 cents is 19.8; the customer keeps the fraction.
        let price = MoneyCents::from(99);
        assert_eq!(cancellation_fee(Accepted, price).value(), 19);
        assert_eq!(cancellation_refund(Accepted, price).value(), 80);
    }
}
