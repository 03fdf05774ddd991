use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY_CODE: &str = "USD";

//--------------------------------------     MoneyCents       --------------------------------------------------------
/// A monetary amount in integer cents. All fare, fee and refund arithmetic in the dispatch engine happens in this
/// type, so there is never any floating-point money anywhere in the system.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct MoneyCents(i64);

op!(binary MoneyCents, Add, add);
op!(binary MoneyCents, Sub, sub);
op!(inplace MoneyCents, SubAssign, sub_assign);
op!(unary MoneyCents, Neg, neg);

impl Mul<i64> for MoneyCents {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for MoneyCents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in cents: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for MoneyCents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for MoneyCents {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for MoneyCents {}

impl TryFrom<u64> for MoneyCents {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {} is too large to convert to MoneyCents", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for MoneyCents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / 100;
        let cents = (self.0 % 100).abs();
        write!(f, "{whole}.{cents:02}")
    }
}

impl MoneyCents {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_whole(units: i64) -> Self {
        Self(units * 100)
    }

    /// Returns `pct` percent of this amount, rounded towards negative infinity.
    pub fn percent(&self, pct: i64) -> Self {
        Self((self.0 * pct).div_euclid(100))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = MoneyCents::from(5000);
        let b = MoneyCents::from(1250);
        assert_eq!((a + b).value(), 6250);
        assert_eq!((a - b).value(), 3750);
        assert_eq!((-b).value(), -1250);
        assert_eq!((b * 3).value(), 3750);
    }

    #[test]
    fn percent_floors() {
        assert_eq!(MoneyCents::from(5000).percent(20).value(), 1000);
        assert_eq!(MoneyCents::from(99).percent(20).value(), 19);
        assert_eq!(MoneyCents::from(1).percent(20).value(), 0);
    }

    #[test]
    fn display() {
        assert_eq!(MoneyCents::from(5025).to_string(), "50.25");
        assert_eq!(MoneyCents::from(7).to_string(), "0.07");
    }
}
