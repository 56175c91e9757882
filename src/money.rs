use crate::CURRENCY_PRECISION;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub},
};
use thiserror::Error;

/// A fixed-point currency value.
///
/// Money is held as a `Decimal` with at most `CURRENCY_PRECISION` decimal places, so two
/// values that display the same cent amount always compare equal. This is what lets the
/// settlement threshold be an exact comparison rather than a float tolerance.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

/// A ratio in the range 0 - 1, e.g. the settled share of an expected amount
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percentage(Decimal);

/// An inclusive date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

#[derive(Error, Debug, Eq, PartialEq)]
pub enum CurrencyError {
    #[error("currency values cannot have more than 2 decimal places: {0}")]
    Precision(Decimal),
    #[error("currency value must not be negative: {0}")]
    Negative(Decimal),
    #[error("the date range {0} - {1} ends before it starts")]
    InvertedRange(NaiveDate, NaiveDate), // from, to
}

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Create a `Money` value, rejecting anything finer than a cent.
    pub fn new(value: Decimal) -> Result<Self, CurrencyError> {
        // Normalise trailing zeros first so that 1.500 is accepted as 1.5
        let value = value.normalize();
        if value.scale() > CURRENCY_PRECISION {
            return Err(CurrencyError::Precision(value));
        }

        Ok(Money(value))
    }

    /// Create a `Money` value that must be zero or positive.
    pub fn non_negative(value: Decimal) -> Result<Self, CurrencyError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(CurrencyError::Negative(value));
        }

        Money::new(value)
    }

    /// Build a value from an integer number of cents.
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, CURRENCY_PRECISION))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Subtract `other`, flooring the result at zero.
    pub fn saturating_sub(self, other: Money) -> Money {
        if other >= self {
            Money::ZERO
        } else {
            self - other
        }
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Percentage {
    pub const ZERO: Percentage = Percentage(Decimal::ZERO);

    /// The share `part / whole`, which is zero when `whole` is zero.
    pub fn of(part: Money, whole: Money) -> Self {
        if whole.is_zero() {
            return Percentage::ZERO;
        }

        Percentage(part.amount() / whole.amount())
    }

    pub fn ratio(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0 * Decimal::ONE_HUNDRED)
    }
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, CurrencyError> {
        if from > to {
            return Err(CurrencyError::InvertedRange(from, to));
        }

        Ok(DateRange { from, to })
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }

    /// Number of days in the range, counting both ends
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }
}
