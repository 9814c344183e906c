//! Positions: units held, optionally at a cost.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::amount::Amount;
use crate::cost::Cost;
use crate::currency::Currency;

/// Units of a currency held at an optional cost.
///
/// Positions without a cost are plain holdings (cash); positions with a
/// cost are lots and participate in booking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// The units held.
    pub units: Amount,
    /// The acquisition cost, for lots.
    pub cost: Option<Cost>,
}

impl Position {
    /// A position without cost tracking.
    #[must_use]
    pub const fn simple(units: Amount) -> Self {
        Self { units, cost: None }
    }

    /// A lot: units held at a cost.
    #[must_use]
    pub const fn with_cost(units: Amount, cost: Cost) -> Self {
        Self {
            units,
            cost: Some(cost),
        }
    }

    /// The currency of the units.
    #[must_use]
    pub fn currency(&self) -> &Currency {
        &self.units.currency
    }

    /// The cost currency, if this is a lot.
    #[must_use]
    pub fn cost_currency(&self) -> Option<&Currency> {
        self.cost.as_ref().map(|c| &c.currency)
    }

    /// The total cost of this position, if it has one.
    #[must_use]
    pub fn book_value(&self) -> Option<Amount> {
        self.cost
            .as_ref()
            .map(|c| Amount::new(c.total(self.units.number), c.currency.clone()))
    }

    /// The position with the sign of its units flipped.
    #[must_use]
    pub fn negated(&self) -> Self {
        Self {
            units: -&self.units,
            cost: self.cost.clone(),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.units)?;
        if let Some(cost) = &self.cost {
            write!(f, " {cost}")?;
        }
        Ok(())
    }
}
