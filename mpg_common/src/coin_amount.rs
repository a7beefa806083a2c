use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const COIN_CURRENCY_CODE: &str = "MKC";
pub const COIN_CURRENCY_CODE_LOWER: &str = "mkc";

/// Number of indivisible subunits in one coin. The wallet network settles with
/// seven fractional digits, so all arithmetic happens on i64 subunits.
const SUBUNITS_PER_COIN: i64 = 10_000_000;

//--------------------------------------     CoinAmount       --------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct CoinAmount(i64);

op!(binary CoinAmount, Add, add);
op!(binary CoinAmount, Sub, sub);
op!(inplace CoinAmount, SubAssign, sub_assign);
op!(unary CoinAmount, Neg, neg);

impl Mul<i64> for CoinAmount {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for CoinAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a coin amount: {0}")]
pub struct CoinAmountConversionError(String);

impl From<i64> for CoinAmount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for CoinAmount {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for CoinAmount {}

impl TryFrom<u64> for CoinAmount {
    type Error = CoinAmountConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(CoinAmountConversionError(format!("Value {} is too large to convert to CoinAmount", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for CoinAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let whole = magnitude / SUBUNITS_PER_COIN as u64;
        let frac = magnitude % SUBUNITS_PER_COIN as u64;
        write!(f, "{sign}{whole}.{frac:07} {COIN_CURRENCY_CODE}")
    }
}

impl CoinAmount {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_coins(coins: i64) -> Self {
        Self(coins * SUBUNITS_PER_COIN)
    }

    /// The discount percentage calculation. `pct` is clamped to 0..=100 so a
    /// mis-entered discount can never exceed the base amount.
    pub fn percent(&self, pct: i64) -> Self {
        let pct = pct.clamp(0, 100);
        Self(self.0 / 100 * pct + self.0 % 100 * pct / 100)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}
