//! Amounts: a decimal quantity paired with a currency.
//!
//! [`Amount`] is the fundamental unit of value. [`IncompleteAmount`] is its
//! parser-side counterpart in which the number, the currency, or both may
//! still be missing and awaiting interpolation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use crate::currency::Currency;

/// A quantity paired with a currency.
///
/// # Examples
///
/// ```
/// use tally_core::Amount;
/// use rust_decimal_macros::dec;
///
/// let amount = Amount::new(dec!(100.00), "USD");
/// assert_eq!(amount.number, dec!(100.00));
/// assert_eq!(amount.currency, "USD");
///
/// let sum = &amount + &Amount::new(dec!(50.00), "USD");
/// assert_eq!(sum.number, dec!(150.00));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    /// The decimal quantity.
    pub number: Decimal,
    /// The currency code.
    pub currency: Currency,
}

impl Amount {
    /// Create a new amount.
    #[must_use]
    pub fn new(number: Decimal, currency: impl Into<Currency>) -> Self {
        Self {
            number,
            currency: currency.into(),
        }
    }

    /// A zero amount in the given currency.
    #[must_use]
    pub fn zero(currency: impl Into<Currency>) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    /// Whether the quantity is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.number.is_zero()
    }

    /// The absolute value.
    #[must_use]
    pub fn abs(&self) -> Self {
        Self {
            number: self.number.abs(),
            currency: self.currency.clone(),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.number, self.currency)
    }
}

impl Add for &Amount {
    type Output = Amount;

    fn add(self, other: &Amount) -> Amount {
        debug_assert_eq!(
            self.currency, other.currency,
            "cannot add amounts with different currencies"
        );
        Amount {
            number: self.number + other.number,
            currency: self.currency.clone(),
        }
    }
}

impl Sub for &Amount {
    type Output = Amount;

    fn sub(self, other: &Amount) -> Amount {
        debug_assert_eq!(
            self.currency, other.currency,
            "cannot subtract amounts with different currencies"
        );
        Amount {
            number: self.number - other.number,
            currency: self.currency.clone(),
        }
    }
}

impl Neg for &Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount {
            number: -self.number,
            currency: self.currency.clone(),
        }
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        &self + &other
    }
}

impl Sub for Amount {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        &self - &other
    }
}

impl Neg for Amount {
    type Output = Self;

    fn neg(self) -> Self {
        -&self
    }
}

impl AddAssign<&Self> for Amount {
    fn add_assign(&mut self, other: &Self) {
        debug_assert_eq!(self.currency, other.currency);
        self.number += other.number;
    }
}

impl SubAssign<&Self> for Amount {
    fn sub_assign(&mut self, other: &Self) {
        debug_assert_eq!(self.currency, other.currency);
        self.number -= other.number;
    }
}

/// An amount whose number and/or currency may still be missing.
///
/// The parser emits these for partial postings; booking fills in the holes.
/// A missing field is distinct from an intentionally absent amount: an
/// elided posting amount is represented by an `IncompleteAmount` with both
/// fields `None`, not by dropping the field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompleteAmount {
    /// The quantity, if supplied.
    pub number: Option<Decimal>,
    /// The currency, if supplied.
    pub currency: Option<Currency>,
}

impl IncompleteAmount {
    /// An amount with both fields missing.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            number: None,
            currency: None,
        }
    }

    /// An amount with only the number supplied.
    #[must_use]
    pub const fn number_only(number: Decimal) -> Self {
        Self {
            number: Some(number),
            currency: None,
        }
    }

    /// An amount with only the currency supplied.
    #[must_use]
    pub fn currency_only(currency: impl Into<Currency>) -> Self {
        Self {
            number: None,
            currency: Some(currency.into()),
        }
    }

    /// Whether both fields are present.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.number.is_some() && self.currency.is_some()
    }

    /// The complete amount, if both fields are present.
    #[must_use]
    pub fn complete(&self) -> Option<Amount> {
        Some(Amount {
            number: self.number?,
            currency: self.currency.clone()?,
        })
    }
}

impl From<Amount> for IncompleteAmount {
    fn from(amount: Amount) -> Self {
        Self {
            number: Some(amount.number),
            currency: Some(amount.currency),
        }
    }
}

impl fmt::Display for IncompleteAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.number, &self.currency) {
            (Some(n), Some(c)) => write!(f, "{n} {c}"),
            (Some(n), None) => write!(f, "{n}"),
            (None, Some(c)) => write!(f, "{c}"),
            (None, None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_and_zero() {
        let amount = Amount::new(dec!(100.00), "USD");
        assert_eq!(amount.number, dec!(100.00));
        assert_eq!(amount.currency, "USD");

        let zero = Amount::zero("EUR");
        assert!(zero.is_zero());
    }

    #[test]
    fn test_arithmetic() {
        let a = Amount::new(dec!(100.00), "USD");
        let b = Amount::new(dec!(40.00), "USD");
        assert_eq!((&a + &b).number, dec!(140.00));
        assert_eq!((&a - &b).number, dec!(60.00));
        assert_eq!((-&a).number, dec!(-100.00));

        let mut c = a.clone();
        c += &b;
        assert_eq!(c.number, dec!(140.00));
        c -= &b;
        assert_eq!(c.number, dec!(100.00));
    }

    #[test]
    fn test_abs() {
        assert_eq!(Amount::new(dec!(-3.50), "USD").abs().number, dec!(3.50));
    }

    #[test]
    fn test_display() {
        assert_eq!(Amount::new(dec!(1234.56), "USD").to_string(), "1234.56 USD");
    }

    #[test]
    fn test_incomplete_amount() {
        let full: IncompleteAmount = Amount::new(dec!(5), "USD").into();
        assert!(full.is_complete());
        assert_eq!(full.complete(), Some(Amount::new(dec!(5), "USD")));

        let partial = IncompleteAmount::currency_only("USD");
        assert!(!partial.is_complete());
        assert_eq!(partial.complete(), None);
        assert_eq!(partial.to_string(), "USD");

        assert_eq!(IncompleteAmount::number_only(dec!(7)).to_string(), "7");
        assert_eq!(IncompleteAmount::empty().to_string(), "");
    }
}
