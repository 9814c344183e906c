//! Tolerances: how far from zero still counts as balanced.
//!
//! Per-currency tolerances start from the option map's defaults and are
//! widened by what the input itself implies: a posting written with two
//! decimal places tolerates half a cent of residual (with the default
//! multiplier). When enabled, cost- and price-scaled tolerances widen the
//! cost currency too.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use tally_core::{BalanceAssertion, CostBasis, Currency, Inventory, Options, Posting};

/// The residual cap: no inferred tolerance may exceed one half.
const TOLERANCE_CAP: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Per-currency tolerances with a fallback default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tolerances {
    map: BTreeMap<Currency, Decimal>,
    default: Decimal,
}

impl Tolerances {
    /// The tolerance for a currency.
    #[must_use]
    pub fn get(&self, currency: &Currency) -> Decimal {
        self.map.get(currency).copied().unwrap_or(self.default)
    }

    /// Whether every position of the residual inventory is within
    /// tolerance.
    #[must_use]
    pub fn is_small(&self, residual: &Inventory) -> bool {
        residual.is_small(|currency| self.get(currency))
    }

    /// Round an interpolated number to the precision the tolerance for
    /// its currency implies. Currencies without an inferred tolerance are
    /// left at full precision.
    #[must_use]
    pub fn quantize(&self, currency: &Currency, number: Decimal) -> Decimal {
        match self.map.get(currency) {
            Some(tolerance) => {
                let doubled = (tolerance + tolerance).normalize();
                number.round_dp(doubled.scale())
            }
            None => number,
        }
    }

    /// Infer tolerances from a transaction's postings.
    ///
    /// Starts from the option map's per-currency defaults, then for each
    /// posting whose units carry decimals derives
    /// `10^-scale × multiplier`, keeping the per-currency maximum. When
    /// `infer_tolerance_from_cost` is set, the same scaled tolerance
    /// multiplied by the per-unit cost (or price) number widens the cost
    /// (or price) currency.
    #[must_use]
    pub fn infer(postings: &[Posting], options: &Options) -> Self {
        let mut tolerances = Self::from_options(options);
        let multiplier = options.inferred_tolerance_multiplier;

        for posting in postings {
            let (Some(number), Some(currency)) = (&posting.units.number, &posting.units.currency)
            else {
                continue;
            };
            let Some(scaled) = scaled_tolerance(*number, multiplier) else {
                continue;
            };
            tolerances.widen(currency, scaled);

            if !options.infer_tolerance_from_cost {
                continue;
            }
            if let Some(cost) = &posting.cost {
                let per_unit = match cost {
                    CostBasis::Bound(cost) => Some((cost.number, &cost.currency)),
                    CostBasis::Incomplete(spec) => match (&spec.number_per, &spec.currency) {
                        (Some(number), Some(currency)) => Some((*number, currency)),
                        _ => None,
                    },
                };
                if let Some((number, currency)) = per_unit {
                    tolerances.widen(currency, scaled * number);
                }
            }
            if let Some(price) = &posting.price {
                let amount = price.amount();
                if let (Some(number), Some(currency)) = (&amount.number, &amount.currency) {
                    tolerances.widen(currency, scaled * *number);
                }
            }
        }

        tolerances
    }

    fn from_options(options: &Options) -> Self {
        let mut map = BTreeMap::new();
        let mut default = Decimal::ZERO;
        for (currency, tolerance) in &options.inferred_tolerance_default {
            if currency == "*" {
                default = *tolerance;
            } else {
                map.insert(Currency::from(currency.as_str()), *tolerance);
            }
        }
        Self { map, default }
    }

    fn widen(&mut self, currency: &Currency, tolerance: Decimal) {
        let tolerance = tolerance.min(TOLERANCE_CAP);
        let entry = self.map.entry(currency.clone()).or_insert(tolerance);
        *entry = (*entry).max(tolerance);
    }
}

/// `10^-scale × multiplier` for a number with decimals; `None` for whole
/// numbers.
fn scaled_tolerance(number: Decimal, multiplier: Decimal) -> Option<Decimal> {
    let scale = number.scale();
    if scale == 0 {
        return None;
    }
    let mut unit = Decimal::ONE;
    unit.set_scale(scale).ok()?;
    Some(unit * multiplier)
}

/// The tolerance of a balance assertion: the explicit `~` value when
/// given, otherwise twice the scale-implied tolerance of the asserted
/// amount, falling back to the option map's per-currency default for
/// whole-number assertions.
#[must_use]
pub fn balance_tolerance(assertion: &BalanceAssertion, options: &Options) -> Decimal {
    if let Some(explicit) = assertion.tolerance {
        return explicit;
    }
    let multiplier = options.inferred_tolerance_multiplier;
    match scaled_tolerance(assertion.amount.number, multiplier) {
        Some(scaled) => scaled + scaled,
        None => options.default_tolerance(&assertion.amount.currency),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tally_core::{Amount, CostSpec, IncompleteAmount, NaiveDate, PriceAnnotation};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_scale_inferred() {
        let postings = vec![
            Posting::new("Assets:Cash", Amount::new(dec!(20.00), "USD")),
            Posting::new("Assets:Cash", Amount::new(dec!(20), "EUR")),
        ];
        let tolerances = Tolerances::infer(&postings, &Options::default());
        assert_eq!(tolerances.get(&"USD".into()), dec!(0.005));
        assert_eq!(tolerances.get(&"EUR".into()), Decimal::ZERO);
    }

    #[test]
    fn test_maximum_wins() {
        let postings = vec![
            Posting::new("Assets:Cash", Amount::new(dec!(20.00), "USD")),
            Posting::new("Assets:Cash", Amount::new(dec!(20.0), "USD")),
        ];
        let tolerances = Tolerances::infer(&postings, &Options::default());
        assert_eq!(tolerances.get(&"USD".into()), dec!(0.05));
    }

    #[test]
    fn test_option_defaults_feed_in() {
        let mut options = Options::default();
        options.set("inferred_tolerance_default", "USD:0.009").unwrap();
        options.set("inferred_tolerance_default", "*:0.001").unwrap();

        let tolerances = Tolerances::infer(&[], &options);
        assert_eq!(tolerances.get(&"USD".into()), dec!(0.009));
        assert_eq!(tolerances.get(&"JPY".into()), dec!(0.001));
    }

    #[test]
    fn test_cost_scaled_tolerance() {
        let posting = Posting::new("Assets:Stock", Amount::new(dec!(10.00), "HOOL")).with_cost(
            CostSpec::empty()
                .with_number_per(dec!(100.00))
                .with_currency("USD"),
        );
        let tolerances = Tolerances::infer(std::slice::from_ref(&posting), &Options::default());
        // 0.005 HOOL units tolerance, times the 100.00 USD cost.
        assert_eq!(tolerances.get(&"USD".into()), dec!(0.5));

        let mut options = Options::default();
        options.set("infer_tolerance_from_cost", "false").unwrap();
        let tolerances = Tolerances::infer(&[posting], &options);
        assert_eq!(tolerances.get(&"USD".into()), Decimal::ZERO);
    }

    #[test]
    fn test_price_scaled_tolerance_is_capped() {
        let posting = Posting::new("Assets:Cash", Amount::new(dec!(10.00), "MXN")).with_price(
            PriceAnnotation::Unit(IncompleteAmount::from(Amount::new(dec!(20000), "COP"))),
        );
        let tolerances = Tolerances::infer(&[posting], &Options::default());
        assert_eq!(tolerances.get(&"COP".into()), dec!(0.5));
    }

    #[test]
    fn test_quantize() {
        let postings = vec![Posting::new("Assets:Cash", Amount::new(dec!(20.00), "USD"))];
        let tolerances = Tolerances::infer(&postings, &Options::default());
        assert_eq!(tolerances.quantize(&"USD".into(), dec!(1.23456789)), dec!(1.23));
        assert_eq!(
            tolerances.quantize(&"EUR".into(), dec!(1.23456789)),
            dec!(1.23456789)
        );
    }

    #[test]
    fn test_balance_tolerance() {
        let options = Options::default();
        let assertion = BalanceAssertion::new(
            date(2024, 1, 1),
            "Assets:Bank",
            Amount::new(dec!(100.00), "USD"),
        );
        // Twice as lenient as within transactions.
        assert_eq!(balance_tolerance(&assertion, &options), dec!(0.010));

        let explicit = assertion.clone().with_tolerance(dec!(0.001));
        assert_eq!(balance_tolerance(&explicit, &options), dec!(0.001));

        let whole = BalanceAssertion::new(
            date(2024, 1, 1),
            "Assets:Bank",
            Amount::new(dec!(100), "USD"),
        );
        assert_eq!(balance_tolerance(&whole, &options), Decimal::ZERO);
    }
}
