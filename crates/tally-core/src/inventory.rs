//! Inventories: multisets of positions keyed by (currency, cost).
//!
//! An [`Inventory`] is the account-level holding structure. It maps a
//! currency plus an optional lot [`Cost`] to a number of units; adding and
//! reducing report a [`ChangeKind`] so booking can tell augmentations from
//! reductions. Entries never hold zero units, keys are unique by
//! construction, and iteration order is deterministic by (currency,
//! cost-identity) so errors are reproducible.
//!
//! # Examples
//!
//! ```
//! use tally_core::{Amount, Inventory};
//! use rust_decimal_macros::dec;
//!
//! let mut inventory = Inventory::new();
//! inventory.add_amount(Amount::new(dec!(10), "USD"), None);
//! inventory.add_amount(Amount::new(dec!(10), "USD"), None);
//! assert_eq!(inventory.len(), 1);
//! assert_eq!(inventory.units(&"USD".into()), dec!(20));
//! ```

use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::amount::Amount;
use crate::cost::Cost;
use crate::currency::Currency;
use crate::position::Position;

/// What an [`Inventory::add_amount`] call did to the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// A new entry was created.
    Created,
    /// An existing entry shrank towards (or through) zero.
    Reduced,
    /// An existing entry grew.
    Augmented,
    /// Nothing happened (zero units against no entry).
    Ignored,
}

/// A single inventory entry key: a currency with an optional lot cost.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct LotKey {
    currency: Currency,
    cost: Option<Cost>,
}

/// A borrowed view of one inventory position.
#[derive(Debug, Clone, Copy)]
pub struct PositionRef<'inv> {
    /// The number of units.
    pub number: &'inv Decimal,
    /// The units currency.
    pub currency: &'inv Currency,
    /// The lot cost, when held at cost.
    pub cost: Option<&'inv Cost>,
}

/// A borrowed view of one costed position (a lot).
#[derive(Debug, Clone, Copy)]
pub struct LotRef<'inv> {
    /// The number of units.
    pub number: &'inv Decimal,
    /// The units currency.
    pub currency: &'inv Currency,
    /// The lot cost.
    pub cost: &'inv Cost,
}

/// A collection of positions keyed by (currency, cost).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    map: BTreeMap<LotKey, Decimal>,
}

impl Inventory {
    /// Create an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether there are no positions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The number of positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// The units at an exact (currency, cost) key, if any.
    #[must_use]
    pub fn get(&self, currency: &Currency, cost: Option<&Cost>) -> Option<Decimal> {
        let key = LotKey {
            currency: currency.clone(),
            cost: cost.cloned(),
        };
        self.map.get(&key).copied()
    }

    /// Iterate over all positions in (currency, cost) order.
    pub fn iter(&self) -> impl Iterator<Item = PositionRef<'_>> {
        self.map.iter().map(|(key, number)| PositionRef {
            number,
            currency: &key.currency,
            cost: key.cost.as_ref(),
        })
    }

    /// Iterate over the costed positions only.
    pub fn iter_lots(&self) -> impl Iterator<Item = LotRef<'_>> {
        self.map.iter().filter_map(|(key, number)| {
            key.cost.as_ref().map(|cost| LotRef {
                number,
                currency: &key.currency,
                cost,
            })
        })
    }

    /// The positions as owned values, in deterministic order.
    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        self.map
            .iter()
            .map(|(key, number)| Position {
                units: Amount::new(*number, key.currency.clone()),
                cost: key.cost.clone(),
            })
            .collect()
    }

    /// Add units at an optional cost.
    ///
    /// Returns the position previously at the key (if any) and what the
    /// call did: nothing for zero units against no entry, a new entry, an
    /// augmentation when the signs agree, or a reduction when they differ.
    /// An entry whose units reach zero is removed.
    pub fn add_amount(
        &mut self,
        units: Amount,
        cost: Option<Cost>,
    ) -> (Option<Position>, ChangeKind) {
        let key = LotKey {
            currency: units.currency,
            cost,
        };
        match self.map.get_mut(&key) {
            None => {
                if units.number.is_zero() {
                    (None, ChangeKind::Ignored)
                } else {
                    self.map.insert(key, units.number);
                    (None, ChangeKind::Created)
                }
            }
            Some(number) => {
                let prior = Position {
                    units: Amount::new(*number, key.currency.clone()),
                    cost: key.cost.clone(),
                };
                let kind = if number.signum() * units.number.signum() < Decimal::ZERO {
                    ChangeKind::Reduced
                } else {
                    ChangeKind::Augmented
                };
                *number += units.number;
                if number.is_zero() {
                    self.map.remove(&key);
                }
                (Some(prior), kind)
            }
        }
    }

    /// Add a position. Equivalent to [`Inventory::add_amount`] with the
    /// position's fields.
    pub fn add_position(&mut self, position: &Position) -> (Option<Position>, ChangeKind) {
        self.add_amount(position.units.clone(), position.cost.clone())
    }

    /// Add every position of another inventory, in its iteration order.
    pub fn add_inventory(&mut self, other: &Self) {
        for (key, number) in &other.map {
            self.add_amount(
                Amount::new(*number, key.currency.clone()),
                key.cost.clone(),
            );
        }
    }

    /// Whether adding `amount` would reduce some existing position:
    /// a non-zero amount with a matching currency and opposite sign.
    #[must_use]
    pub fn is_reduced_by(&self, amount: &Amount) -> bool {
        if amount.number.is_zero() {
            return false;
        }
        let positive = amount.number.is_sign_positive();
        self.iter()
            .any(|pos| pos.currency == &amount.currency && pos.number.is_sign_positive() != positive)
    }

    /// Whether every position is within the per-currency tolerance.
    #[must_use]
    pub fn is_small<F: Fn(&Currency) -> Decimal>(&self, tolerance: F) -> bool {
        self.iter().all(|pos| pos.number.abs() <= tolerance(pos.currency))
    }

    /// Whether some currency holds positions of both signs.
    #[must_use]
    pub fn is_mixed(&self) -> bool {
        let mut signs: BTreeMap<&Currency, bool> = BTreeMap::new();
        for pos in self.iter() {
            let positive = pos.number.is_sign_positive();
            match signs.get(pos.currency) {
                Some(seen) if *seen != positive => return true,
                Some(_) => {}
                None => {
                    signs.insert(pos.currency, positive);
                }
            }
        }
        false
    }

    /// The signed sum of units for a currency, across all its lots.
    #[must_use]
    pub fn units(&self, currency: &Currency) -> Decimal {
        self.iter()
            .filter(|pos| pos.currency == currency)
            .map(|pos| *pos.number)
            .sum()
    }

    /// Collapse to per-(currency, cost-currency) averages.
    ///
    /// Each group becomes one position: units are summed; costed groups get
    /// the per-unit average cost, the earliest acquisition date, and no
    /// label. Groups whose units sum to zero are dropped.
    #[must_use]
    pub fn average(&self) -> Self {
        struct Group {
            units: Decimal,
            total_cost: Decimal,
            earliest: Option<chrono::NaiveDate>,
        }

        let mut groups: BTreeMap<(Currency, Option<Currency>), Group> = BTreeMap::new();
        for pos in self.iter() {
            let group_key = (pos.currency.clone(), pos.cost.map(|c| c.currency.clone()));
            let group = groups.entry(group_key).or_insert(Group {
                units: Decimal::ZERO,
                total_cost: Decimal::ZERO,
                earliest: None,
            });
            group.units += *pos.number;
            if let Some(cost) = pos.cost {
                group.total_cost += cost.number * *pos.number;
                group.earliest = Some(match group.earliest {
                    Some(d) => d.min(cost.date),
                    None => cost.date,
                });
            }
        }

        let mut result = Self::new();
        for ((currency, cost_currency), group) in groups {
            if group.units.is_zero() {
                continue;
            }
            let cost = match (cost_currency, group.earliest) {
                (Some(cost_currency), Some(date)) => Some(Cost::new(
                    group.total_cost / group.units,
                    cost_currency,
                    date,
                )),
                _ => None,
            };
            result.add_amount(Amount::new(group.units, currency), cost);
        }
        result
    }

    /// Split into one inventory per units currency.
    #[must_use]
    pub fn split(&self) -> BTreeMap<Currency, Self> {
        let mut result: BTreeMap<Currency, Self> = BTreeMap::new();
        for (key, number) in &self.map {
            result
                .entry(key.currency.clone())
                .or_default()
                .map
                .insert(key.clone(), *number);
        }
        result
    }

    /// The distinct units currencies, in order.
    #[must_use]
    pub fn currencies(&self) -> Vec<&Currency> {
        let mut currencies: Vec<&Currency> = self.map.keys().map(|k| &k.currency).collect();
        currencies.dedup();
        currencies
    }

    /// The distinct cost currencies, in order.
    #[must_use]
    pub fn cost_currencies(&self) -> Vec<&Currency> {
        let set: BTreeSet<&Currency> = self
            .map
            .keys()
            .filter_map(|k| k.cost.as_ref().map(|c| &c.currency))
            .collect();
        set.into_iter().collect()
    }

    /// The distinct (units currency, cost currency) pairs.
    #[must_use]
    pub fn currency_pairs(&self) -> BTreeSet<(Currency, Option<Currency>)> {
        self.map
            .keys()
            .map(|k| (k.currency.clone(), k.cost.as_ref().map(|c| c.currency.clone())))
            .collect()
    }

    /// Check the structural invariants: unique keys and no zero units.
    ///
    /// Key uniqueness holds by construction; a zero-unit entry indicates a
    /// bookkeeping bug and is reported with its key.
    pub fn check_invariants(&self) -> Result<(), String> {
        for pos in self.iter() {
            if pos.number.is_zero() {
                return Err(format!(
                    "inventory holds zero units of {}{}",
                    pos.currency,
                    pos.cost.map(|c| format!(" {c}")).unwrap_or_default()
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(empty)");
        }
        for (i, position) in self.positions().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{position}")?;
        }
        Ok(())
    }
}

impl FromIterator<Position> for Inventory {
    fn from_iter<I: IntoIterator<Item = Position>>(iter: I) -> Self {
        let mut inventory = Self::new();
        for position in iter {
            inventory.add_position(&position);
        }
        inventory
    }
}

impl FromIterator<Amount> for Inventory {
    fn from_iter<I: IntoIterator<Item = Amount>>(iter: I) -> Self {
        let mut inventory = Self::new();
        for amount in iter {
            inventory.add_amount(amount, None);
        }
        inventory
    }
}

impl Serialize for Inventory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.positions().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Inventory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let positions = Vec::<Position>::deserialize(deserializer)?;
        Ok(positions.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn usd(n: Decimal) -> Amount {
        Amount::new(n, "USD")
    }

    #[test]
    fn test_add_amount_outcomes() {
        let mut inv = Inventory::new();

        let (prior, kind) = inv.add_amount(usd(dec!(0)), None);
        assert!(prior.is_none());
        assert_eq!(kind, ChangeKind::Ignored);

        let (prior, kind) = inv.add_amount(usd(dec!(100)), None);
        assert!(prior.is_none());
        assert_eq!(kind, ChangeKind::Created);

        let (prior, kind) = inv.add_amount(usd(dec!(50)), None);
        assert_eq!(prior.unwrap().units, usd(dec!(100)));
        assert_eq!(kind, ChangeKind::Augmented);

        let (prior, kind) = inv.add_amount(usd(dec!(-30)), None);
        assert_eq!(prior.unwrap().units, usd(dec!(150)));
        assert_eq!(kind, ChangeKind::Reduced);

        assert_eq!(inv.units(&"USD".into()), dec!(120));
    }

    #[test]
    fn test_entry_removed_at_zero() {
        let mut inv = Inventory::new();
        inv.add_amount(usd(dec!(2.0)), None);
        inv.add_amount(usd(dec!(-2.0)), None);
        assert!(inv.is_empty());
        assert!(inv.check_invariants().is_ok());
    }

    #[test]
    fn test_lots_do_not_merge_across_costs() {
        let mut inv = Inventory::new();
        let cost1 = Cost::new(dec!(100.00), "USD", date(2024, 1, 1));
        let cost2 = Cost::new(dec!(120.00), "USD", date(2024, 2, 1));
        inv.add_amount(Amount::new(dec!(10), "HOOL"), Some(cost1.clone()));
        inv.add_amount(Amount::new(dec!(5), "HOOL"), Some(cost2));
        inv.add_amount(Amount::new(dec!(2), "HOOL"), Some(cost1));

        assert_eq!(inv.len(), 2);
        assert_eq!(inv.units(&"HOOL".into()), dec!(17));
    }

    #[test]
    fn test_is_reduced_by() {
        let mut inv = Inventory::new();
        inv.add_amount(usd(dec!(10)), None);
        assert!(inv.is_reduced_by(&usd(dec!(-5))));
        assert!(!inv.is_reduced_by(&usd(dec!(5))));
        assert!(!inv.is_reduced_by(&usd(dec!(0))));
        assert!(!inv.is_reduced_by(&Amount::new(dec!(-5), "EUR")));
    }

    #[test]
    fn test_is_small() {
        let mut inv = Inventory::new();
        inv.add_amount(usd(dec!(0.004)), None);
        assert!(inv.is_small(|_| dec!(0.005)));
        assert!(!inv.is_small(|_| dec!(0.003)));
        assert!(Inventory::new().is_small(|_| Decimal::ZERO));
    }

    #[test]
    fn test_is_mixed() {
        let mut inv = Inventory::new();
        let cost = Cost::new(dec!(1), "USD", date(2024, 1, 1));
        inv.add_amount(Amount::new(dec!(10), "HOOL"), Some(cost));
        assert!(!inv.is_mixed());
        inv.add_amount(Amount::new(dec!(-3), "HOOL"), None);
        assert!(inv.is_mixed());
    }

    #[test]
    fn test_add_inventory() {
        let mut a = Inventory::new();
        a.add_amount(usd(dec!(10)), None);
        let mut b = Inventory::new();
        b.add_amount(usd(dec!(5)), None);
        b.add_amount(Amount::new(dec!(3), "EUR"), None);

        a.add_inventory(&b);
        assert_eq!(a.units(&"USD".into()), dec!(15));
        assert_eq!(a.units(&"EUR".into()), dec!(3));
    }

    #[test]
    fn test_average() {
        let mut inv = Inventory::new();
        inv.add_amount(
            Amount::new(dec!(10), "HOOL"),
            Some(Cost::new(dec!(100.00), "USD", date(2024, 2, 1))),
        );
        inv.add_amount(
            Amount::new(dec!(10), "HOOL"),
            Some(Cost::new(dec!(120.00), "USD", date(2024, 1, 1))),
        );
        inv.add_amount(usd(dec!(50)), None);

        let averaged = inv.average();
        assert_eq!(averaged.len(), 2);
        let lot = averaged.iter_lots().next().unwrap();
        assert_eq!(*lot.number, dec!(20));
        assert_eq!(lot.cost.number, dec!(110.00));
        assert_eq!(lot.cost.date, date(2024, 1, 1));
        assert!(lot.cost.label.is_none());
        assert_eq!(averaged.units(&"USD".into()), dec!(50));
    }

    #[test]
    fn test_average_drops_zero_groups() {
        let mut inv = Inventory::new();
        inv.add_amount(
            Amount::new(dec!(10), "HOOL"),
            Some(Cost::new(dec!(100.00), "USD", date(2024, 1, 1))),
        );
        inv.add_amount(
            Amount::new(dec!(-10), "HOOL"),
            Some(Cost::new(dec!(120.00), "USD", date(2024, 2, 1))),
        );
        assert!(inv.average().is_empty());
    }

    #[test]
    fn test_split() {
        let mut inv = Inventory::new();
        inv.add_amount(usd(dec!(10)), None);
        inv.add_amount(Amount::new(dec!(3), "EUR"), None);
        inv.add_amount(
            Amount::new(dec!(1), "EUR"),
            Some(Cost::new(dec!(1.1), "USD", date(2024, 1, 1))),
        );

        let by_currency = inv.split();
        assert_eq!(by_currency.len(), 2);
        assert_eq!(by_currency[&Currency::from("EUR")].len(), 2);
        assert_eq!(by_currency[&Currency::from("USD")].units(&"USD".into()), dec!(10));
    }

    #[test]
    fn test_currency_sets() {
        let mut inv = Inventory::new();
        inv.add_amount(usd(dec!(10)), None);
        inv.add_amount(
            Amount::new(dec!(5), "HOOL"),
            Some(Cost::new(dec!(100), "USD", date(2024, 1, 1))),
        );
        inv.add_amount(
            Amount::new(dec!(5), "SAP"),
            Some(Cost::new(dec!(90), "EUR", date(2024, 1, 1))),
        );

        let currencies: Vec<&str> = inv.currencies().iter().map(|c| c.as_str()).collect();
        assert_eq!(currencies, vec!["HOOL", "SAP", "USD"]);
        let cost_currencies: Vec<&str> = inv.cost_currencies().iter().map(|c| c.as_str()).collect();
        assert_eq!(cost_currencies, vec!["EUR", "USD"]);

        let pairs = inv.currency_pairs();
        assert!(pairs.contains(&("USD".into(), None)));
        assert!(pairs.contains(&("HOOL".into(), Some("USD".into()))));
        assert!(pairs.contains(&("SAP".into(), Some("EUR".into()))));
    }

    #[test]
    fn test_display() {
        assert_eq!(Inventory::new().to_string(), "(empty)");
        let mut inv = Inventory::new();
        inv.add_amount(usd(dec!(100)), None);
        assert_eq!(inv.to_string(), "100 USD");
    }

    #[test]
    fn test_from_iterators() {
        let inv: Inventory = vec![usd(dec!(100)), usd(dec!(50))].into_iter().collect();
        assert_eq!(inv.units(&"USD".into()), dec!(150));

        let positions = vec![Position::simple(usd(dec!(10)))];
        let inv: Inventory = positions.into_iter().collect();
        assert_eq!(inv.len(), 1);
    }
}
