use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

//--------------------------------------     FxAmount       ----------------------------------------------------------
/// An amount quoted by an agent in their foreign-currency unit. The engine never converts between
/// foreign currencies; the only conversion that exists is foreign units → [`crate::Points`] at
/// settlement, using the admin-configured exchange rate.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct FxAmount(i64);

op!(binary FxAmount, Add, add);
op!(binary FxAmount, Sub, sub);
op!(inplace FxAmount, SubAssign, sub_assign);
op!(unary FxAmount, Neg, neg);

impl Sum for FxAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a foreign amount: {0}")]
pub struct FxConversionError(String);

impl From<i64> for FxAmount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for FxAmount {
    type Error = FxConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(FxConversionError(format!("Value {value} is too large to convert to FxAmount")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl PartialEq for FxAmount {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for FxAmount {}

impl Display for FxAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "¤{}", self.0)
    }
}

impl FxAmount {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}
