//! Lot costs and cost specifications.
//!
//! A [`Cost`] is the fully resolved acquisition cost of a lot: per-unit
//! price, currency, acquisition date and an optional label. A [`CostSpec`]
//! is what the parser emits: any of its fields may be missing, either to be
//! interpolated or to select existing lots by partial match. Booking turns
//! specs into costs.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::currency::Currency;

/// The resolved acquisition cost of a lot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cost {
    /// Cost per unit.
    pub number: Decimal,
    /// Currency of the cost.
    pub currency: Currency,
    /// Acquisition date.
    pub date: NaiveDate,
    /// Lot label, if one was given.
    pub label: Option<String>,
}

impl Cost {
    /// Create a cost with the given per-unit number, currency and date.
    #[must_use]
    pub fn new(number: Decimal, currency: impl Into<Currency>, date: NaiveDate) -> Self {
        Self {
            number,
            currency: currency.into(),
            date,
            label: None,
        }
    }

    /// Attach a lot label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The total cost of `units` units at this per-unit cost.
    #[must_use]
    pub fn total(&self, units: Decimal) -> Decimal {
        self.number * units
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{} {}, {}", self.number, self.currency, self.date)?;
        if let Some(label) = &self.label {
            write!(f, ", \"{label}\"")?;
        }
        write!(f, "}}")
    }
}

/// An unbound cost specification, as written in the input.
///
/// Fields that are present act as constraints when matching existing lots
/// and as values when creating new ones; missing fields are filled in by
/// booking or interpolation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CostSpec {
    /// Cost per unit, if given.
    pub number_per: Option<Decimal>,
    /// Total cost, if given (the `{{...}}` form).
    pub number_total: Option<Decimal>,
    /// Cost currency, if given.
    pub currency: Option<Currency>,
    /// Acquisition date, if given.
    pub date: Option<NaiveDate>,
    /// Lot label, if given.
    pub label: Option<String>,
    /// Whether lots should be merged before matching (the `*` marker).
    pub merge: bool,
}

impl CostSpec {
    /// A spec with no constraints.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set the per-unit number.
    #[must_use]
    pub const fn with_number_per(mut self, number: Decimal) -> Self {
        self.number_per = Some(number);
        self
    }

    /// Set the total number.
    #[must_use]
    pub const fn with_number_total(mut self, number: Decimal) -> Self {
        self.number_total = Some(number);
        self
    }

    /// Set the currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<Currency>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Set the acquisition date.
    #[must_use]
    pub const fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Set the lot label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Whether no field at all was given (a bare `{}`).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.number_per.is_none()
            && self.number_total.is_none()
            && self.currency.is_none()
            && self.date.is_none()
            && self.label.is_none()
            && !self.merge
    }

    /// Whether a cost with the given fields satisfies every constraint this
    /// spec carries.
    #[must_use]
    pub fn matches(&self, cost: &Cost) -> bool {
        self.number_per.map_or(true, |n| n == cost.number)
            && self.currency.as_ref().map_or(true, |c| *c == cost.currency)
            && self.date.map_or(true, |d| d == cost.date)
            && self
                .label
                .as_ref()
                .map_or(true, |l| cost.label.as_deref() == Some(l.as_str()))
    }

    /// Bind this spec to a concrete [`Cost`].
    ///
    /// The per-unit number is `(number_total + number_per × |units|) /
    /// |units|`, with absent terms omitted; a spec without a date takes the
    /// given fallback date. Returns `None` when the currency or every
    /// number is missing, or when a total cost is given without units.
    #[must_use]
    pub fn bind(&self, units: Option<Decimal>, date: NaiveDate) -> Option<Cost> {
        let currency = self.currency.clone()?;
        let number = if let Some(total) = self.number_total {
            let units = units?.abs();
            if units.is_zero() {
                return None;
            }
            let mut full = total;
            if let Some(per) = self.number_per {
                full += per * units;
            }
            full / units
        } else {
            self.number_per?
        };
        Some(Cost {
            number,
            currency,
            date: self.date.unwrap_or(date),
            label: self.label.clone(),
        })
    }
}

impl From<&Cost> for CostSpec {
    fn from(cost: &Cost) -> Self {
        Self {
            number_per: Some(cost.number),
            number_total: None,
            currency: Some(cost.currency.clone()),
            date: Some(cost.date),
            label: cost.label.clone(),
            merge: false,
        }
    }
}

impl fmt::Display for CostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(n) = self.number_per {
            parts.push(n.to_string());
        }
        if let Some(n) = self.number_total {
            parts.push(format!("# {n}"));
        }
        if let Some(c) = &self.currency {
            parts.push(c.to_string());
        }
        if let Some(d) = self.date {
            parts.push(d.to_string());
        }
        if let Some(l) = &self.label {
            parts.push(format!("\"{l}\""));
        }
        if self.merge {
            parts.push("*".to_string());
        }
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// The cost attached to a posting: unbound before booking, bound after.
///
/// `None` at the posting level means the posting intentionally has no cost,
/// which is different from a present-but-unbound spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostBasis {
    /// A spec as parsed, not yet matched to a lot.
    Incomplete(CostSpec),
    /// A resolved lot cost.
    Bound(Cost),
}

impl CostBasis {
    /// The bound cost, if booking has run.
    #[must_use]
    pub const fn bound(&self) -> Option<&Cost> {
        match self {
            Self::Bound(cost) => Some(cost),
            Self::Incomplete(_) => None,
        }
    }

    /// The unbound spec, if booking has not run.
    #[must_use]
    pub const fn spec(&self) -> Option<&CostSpec> {
        match self {
            Self::Incomplete(spec) => Some(spec),
            Self::Bound(_) => None,
        }
    }

    /// The cost currency, from whichever side is present.
    #[must_use]
    pub fn currency(&self) -> Option<&Currency> {
        match self {
            Self::Incomplete(spec) => spec.currency.as_ref(),
            Self::Bound(cost) => Some(&cost.currency),
        }
    }
}

impl From<CostSpec> for CostBasis {
    fn from(spec: CostSpec) -> Self {
        Self::Incomplete(spec)
    }
}

impl From<Cost> for CostBasis {
    fn from(cost: Cost) -> Self {
        Self::Bound(cost)
    }
}

impl fmt::Display for CostBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete(spec) => spec.fmt(f),
            Self::Bound(cost) => cost.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_cost_total() {
        let cost = Cost::new(dec!(150.00), "USD", date(2024, 1, 15));
        assert_eq!(cost.total(dec!(10)), dec!(1500.00));
    }

    #[test]
    fn test_cost_display() {
        let cost = Cost::new(dec!(150.00), "USD", date(2024, 1, 15)).with_label("lot1");
        assert_eq!(cost.to_string(), "{150.00 USD, 2024-01-15, \"lot1\"}");
    }

    #[test]
    fn test_spec_matches() {
        let cost = Cost::new(dec!(150.00), "USD", date(2024, 1, 15)).with_label("lot1");

        assert!(CostSpec::empty().matches(&cost));
        assert!(CostSpec::empty().with_number_per(dec!(150.00)).matches(&cost));
        assert!(!CostSpec::empty().with_number_per(dec!(160.00)).matches(&cost));
        assert!(CostSpec::empty().with_currency("USD").matches(&cost));
        assert!(!CostSpec::empty().with_currency("EUR").matches(&cost));
        assert!(CostSpec::empty().with_date(date(2024, 1, 15)).matches(&cost));
        assert!(!CostSpec::empty().with_date(date(2024, 1, 16)).matches(&cost));
        assert!(CostSpec::empty().with_label("lot1").matches(&cost));
        assert!(!CostSpec::empty().with_label("lot2").matches(&cost));
    }

    #[test]
    fn test_spec_bind_per_unit() {
        let spec = CostSpec::empty()
            .with_number_per(dec!(150.00))
            .with_currency("USD");
        let cost = spec.bind(Some(dec!(10)), date(2024, 1, 15)).unwrap();
        assert_eq!(cost.number, dec!(150.00));
        assert_eq!(cost.date, date(2024, 1, 15));
    }

    #[test]
    fn test_spec_bind_total() {
        let spec = CostSpec::empty()
            .with_number_total(dec!(1500.00))
            .with_currency("USD");
        let cost = spec.bind(Some(dec!(-10)), date(2024, 1, 15)).unwrap();
        assert_eq!(cost.number, dec!(150.00));
    }

    #[test]
    fn test_spec_bind_compound() {
        // {100.00 # 9.95 USD} for 10 units: (9.95 + 100 * 10) / 10
        let spec = CostSpec::empty()
            .with_number_per(dec!(100.00))
            .with_number_total(dec!(9.95))
            .with_currency("USD");
        let cost = spec.bind(Some(dec!(10)), date(2024, 1, 15)).unwrap();
        assert_eq!(cost.number, dec!(100.995));
    }

    #[test]
    fn test_spec_bind_keeps_explicit_date() {
        let spec = CostSpec::empty()
            .with_number_per(dec!(1))
            .with_currency("USD")
            .with_date(date(2023, 6, 1));
        let cost = spec.bind(Some(dec!(1)), date(2024, 1, 15)).unwrap();
        assert_eq!(cost.date, date(2023, 6, 1));
    }

    #[test]
    fn test_spec_bind_missing() {
        assert!(CostSpec::empty().bind(Some(dec!(1)), date(2024, 1, 1)).is_none());
        let no_currency = CostSpec::empty().with_number_per(dec!(1));
        assert!(no_currency.bind(Some(dec!(1)), date(2024, 1, 1)).is_none());
        let total_no_units = CostSpec::empty()
            .with_number_total(dec!(10))
            .with_currency("USD");
        assert!(total_no_units.bind(None, date(2024, 1, 1)).is_none());
    }
}
