//! The price map: dated price series per ordered currency pair.
//!
//! Built once from the loaded entry stream's [`Price`](crate::Price)
//! directives and read-only afterwards. Each ordered pair `(base, quote)`
//! holds a date-sorted series with unique dates. When a ledger quotes both
//! directions of a pair explicitly, the direction with fewer samples is
//! folded into the other, and every forward series then materializes its
//! pointwise-reciprocal inverse, so either direction can be looked up.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::currency::Currency;
use crate::directive::Directive;

/// An ordered (base, quote) currency pair.
pub type PricePair = (Currency, Currency);

/// One resolved price: the sample date (absent for identity rates) and the
/// rate itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    /// The date of the sample used, when one exists.
    pub date: Option<NaiveDate>,
    /// Units of the quote currency per unit of the base currency.
    pub rate: Decimal,
}

/// A read-only index of dated prices per currency pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceMap {
    /// Date-sorted samples per ordered pair.
    rates: BTreeMap<PricePair, Vec<(NaiveDate, Decimal)>>,
    /// The canonical quoting directions seen in the input.
    forward_pairs: BTreeSet<PricePair>,
}

impl PriceMap {
    /// Build the map from the Price directives in an entry stream.
    #[must_use]
    pub fn build(entries: &[Directive]) -> Self {
        // Collect per-pair series with unique dates, last write per date
        // winning.
        let mut by_pair: BTreeMap<PricePair, BTreeMap<NaiveDate, Decimal>> = BTreeMap::new();
        for entry in entries {
            if let Directive::Price(price) = entry {
                let pair = (price.currency.clone(), price.amount.currency.clone());
                by_pair
                    .entry(pair)
                    .or_default()
                    .insert(price.date, price.amount.number);
            }
        }

        // Where both directions were quoted explicitly, fold the sparser
        // one into the denser one (existing dates win over inverted ones).
        let explicit: BTreeSet<PricePair> = by_pair.keys().cloned().collect();
        let mut forward_pairs = BTreeSet::new();
        for pair in &explicit {
            let (base, quote) = pair;
            let inverse = (quote.clone(), base.clone());
            if !explicit.contains(&inverse) {
                forward_pairs.insert(pair.clone());
                continue;
            }
            // Process each unordered pair once, from its denser side; the
            // sparser side has no series left once it has been folded.
            let Some(my_len) = by_pair.get(pair).map(std::collections::BTreeMap::len) else {
                continue;
            };
            let other_len = by_pair.get(&inverse).map_or(0, std::collections::BTreeMap::len);
            let keep_this = match my_len.cmp(&other_len) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Less => false,
                std::cmp::Ordering::Equal => pair < &inverse,
            };
            if !keep_this {
                continue;
            }
            let folded = by_pair.remove(&inverse).unwrap_or_default();
            let target = by_pair.entry(pair.clone()).or_default();
            for (date, rate) in folded {
                if !rate.is_zero() {
                    target.entry(date).or_insert(Decimal::ONE / rate);
                }
            }
            forward_pairs.insert(pair.clone());
        }

        // Materialize the reciprocal series for every remaining pair.
        let mut rates: BTreeMap<PricePair, Vec<(NaiveDate, Decimal)>> = BTreeMap::new();
        for (pair, series) in by_pair {
            let inverse_pair = (pair.1.clone(), pair.0.clone());
            let inverted: Vec<(NaiveDate, Decimal)> = series
                .iter()
                .filter(|(_, rate)| !rate.is_zero())
                .map(|(date, rate)| (*date, Decimal::ONE / rate))
                .collect();
            rates.insert(pair, series.into_iter().collect());
            rates.insert(inverse_pair, inverted);
        }

        Self {
            rates,
            forward_pairs,
        }
    }

    /// The canonical quoting directions, for reporting.
    pub fn forward_pairs(&self) -> impl Iterator<Item = &PricePair> {
        self.forward_pairs.iter()
    }

    /// The rate for a pair: the latest sample when `date` is absent,
    /// otherwise the latest sample strictly before `date`.
    ///
    /// A pair of a currency with itself has rate one and no date. Returns
    /// `None` when no applicable sample exists.
    #[must_use]
    pub fn get_price(
        &self,
        base: &Currency,
        quote: &Currency,
        date: Option<NaiveDate>,
    ) -> Option<PricePoint> {
        if base == quote {
            return Some(PricePoint {
                date: None,
                rate: Decimal::ONE,
            });
        }
        let series = self.rates.get(&(base.clone(), quote.clone()))?;
        let sample = match date {
            None => series.last()?,
            Some(cutoff) => {
                let before = series.partition_point(|(d, _)| *d < cutoff);
                if before == 0 {
                    return None;
                }
                &series[before - 1]
            }
        };
        Some(PricePoint {
            date: Some(sample.0),
            rate: sample.1,
        })
    }

    /// The latest sample for a pair.
    #[must_use]
    pub fn get_latest_price(&self, base: &Currency, quote: &Currency) -> Option<PricePoint> {
        self.get_price(base, quote, None)
    }

    /// The full series for a pair, falling back to the reciprocals of the
    /// inverse pair when the forward direction is absent.
    #[must_use]
    pub fn get_all_prices(&self, base: &Currency, quote: &Currency) -> Vec<(NaiveDate, Decimal)> {
        if let Some(series) = self.rates.get(&(base.clone(), quote.clone())) {
            return series.clone();
        }
        self.rates
            .get(&(quote.clone(), base.clone()))
            .map(|series| {
                series
                    .iter()
                    .filter(|(_, rate)| !rate.is_zero())
                    .map(|(date, rate)| (*date, Decimal::ONE / rate))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Synthesize `(B, to)` series from `(B, from) × (from, to)`.
    ///
    /// Every base currency quoted in `from` (restricted to `base_set` when
    /// given) gets projected samples at the dates of its `(B, from)`
    /// series, using the `(from, to)` rate at or before each date. Dates
    /// already present in `(B, to)` are left alone; the reciprocal series
    /// is kept in step.
    pub fn project(
        &mut self,
        from: &Currency,
        to: &Currency,
        base_set: Option<&BTreeSet<Currency>>,
    ) {
        let bases: Vec<Currency> = self
            .rates
            .keys()
            .filter(|(_, quote)| quote == from)
            .map(|(base, _)| base.clone())
            .filter(|base| base != to && base != from)
            .filter(|base| base_set.map_or(true, |set| set.contains(base)))
            .collect();

        for base in bases {
            let series = self.rates[&(base.clone(), from.clone())].clone();
            let mut synthesized = Vec::new();
            for (date, rate) in series {
                if let Some(conversion) = self.rate_at_or_before(from, to, date) {
                    synthesized.push((date, rate * conversion));
                }
            }

            let existing: BTreeSet<NaiveDate> = self
                .rates
                .get(&(base.clone(), to.clone()))
                .map(|series| series.iter().map(|(d, _)| *d).collect())
                .unwrap_or_default();
            synthesized.retain(|(date, _)| !existing.contains(date));
            if synthesized.is_empty() {
                continue;
            }

            let forward = self.rates.entry((base.clone(), to.clone())).or_default();
            forward.extend(synthesized.iter().copied());
            forward.sort_by_key(|(d, _)| *d);

            let inverse = self.rates.entry((to.clone(), base.clone())).or_default();
            inverse.extend(
                synthesized
                    .iter()
                    .filter(|(_, rate)| !rate.is_zero())
                    .map(|(date, rate)| (*date, Decimal::ONE / *rate)),
            );
            inverse.sort_by_key(|(d, _)| *d);

            self.forward_pairs.insert((base, to.clone()));
        }
    }

    fn rate_at_or_before(
        &self,
        base: &Currency,
        quote: &Currency,
        date: NaiveDate,
    ) -> Option<Decimal> {
        let series = self.rates.get(&(base.clone(), quote.clone()))?;
        let upto = series.partition_point(|(d, _)| *d <= date);
        if upto == 0 {
            None
        } else {
            Some(series[upto - 1].1)
        }
    }
}
