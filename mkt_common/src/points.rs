use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

//--------------------------------------      Points        ----------------------------------------------------------
/// The platform's reward-point currency. Agents earn points as settlement commission; points are
/// whole units and may legitimately go negative during manual adjustments.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Points(i64);

op!(binary Points, Add, add);
op!(binary Points, Sub, sub);
op!(inplace Points, AddAssign, add_assign);
op!(inplace Points, SubAssign, sub_assign);
op!(unary Points, Neg, neg);

impl Sum for Points {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as Points: {0}")]
pub struct PointsConversionError(String);

impl From<i64> for Points {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for Points {
    type Error = PointsConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(PointsConversionError(format!("Value {value} is too large to convert to Points")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl PartialEq for Points {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Points {}

impl Display for Points {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}pt", self.0)
    }
}

impl Points {
    pub fn value(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn points_arithmetic() {
        let a = Points::from(2500);
        let b = Points::from(500);
        assert_eq!(a + b, Points::from(3000));
        assert_eq!(a - b, Points::from(2000));
        assert_eq!(-b, Points::from(-500));
        let mut c = a;
        c += b;
        assert_eq!(c, Points::from(3000));
        assert_eq!(format!("{a}"), "2500pt");
    }

    #[test]
    fn points_sum() {
        let total: Points = [1i64, 2, 3].into_iter().map(Points::from).sum();
        assert_eq!(total, Points::from(6));
    }
}
