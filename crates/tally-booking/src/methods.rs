//! Lot matching: resolving a reduction against the candidate lots.
//!
//! Given the lots of an account that a reducing posting may consume, the
//! booking method decides which ones it actually consumes. STRICT demands
//! an unambiguous answer, the ordered methods (FIFO, LIFO, HIFO) consume
//! lots in a defined order and split the last one, and AVERAGE has been
//! collapsed to a single lot per cost currency before this module runs.

use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use std::cmp::Reverse;

use tally_core::{Amount, Booking, Cost, CostBasis, Currency, Posting};

use crate::error::BookingErrorKind;

/// One candidate lot a reduction may consume.
#[derive(Debug, Clone)]
pub(crate) struct Lot {
    pub number: Decimal,
    pub currency: Currency,
    pub cost: Cost,
}

/// A resolved consumption: how many units to take from which lot.
#[derive(Debug, Clone)]
pub(crate) struct Consumption {
    pub units: Amount,
    pub cost: Cost,
}

/// The order in which ordered methods walk the candidate lots.
enum ConsumeOrder {
    Fifo,
    Lifo,
    Hifo,
}

/// Resolve which lots a reduction consumes.
///
/// `units` is the signed reduction; `lots` are candidates that already
/// match the posting's cost constraints. AVERAGE must have been collapsed
/// by the caller; NONE never reaches this function.
pub(crate) fn resolve_reduction(
    method: Booking,
    units: &Amount,
    lots: Vec<Lot>,
) -> Result<Vec<Consumption>, BookingErrorKind> {
    match method {
        Booking::Strict => resolve_strict(units, &lots, false),
        Booking::StrictWithSize => resolve_strict(units, &lots, true),
        Booking::Fifo => resolve_ordered(units, lots, &ConsumeOrder::Fifo),
        Booking::Lifo => resolve_ordered(units, lots, &ConsumeOrder::Lifo),
        Booking::Hifo => resolve_ordered(units, lots, &ConsumeOrder::Hifo),
        // AVERAGE collapses to a single lot first, then consumes in date
        // order like FIFO.
        Booking::Average => resolve_ordered(units, lots, &ConsumeOrder::Fifo),
        Booking::None => unreachable!("NONE booking never matches lots"),
    }
}

/// Consume lots in FIFO / LIFO / HIFO order, splitting the last one.
fn resolve_ordered(
    units: &Amount,
    mut lots: Vec<Lot>,
    order: &ConsumeOrder,
) -> Result<Vec<Consumption>, BookingErrorKind> {
    match order {
        ConsumeOrder::Fifo => lots.sort_by_key(|lot| lot.cost.date),
        ConsumeOrder::Lifo => lots.sort_by_key(|lot| Reverse(lot.cost.date)),
        ConsumeOrder::Hifo => lots.sort_by_key(|lot| Reverse(lot.cost.number)),
    }

    let sign = units.number.signum();
    let mut remaining = units.number.abs();
    let mut consumed = Vec::new();

    for lot in lots {
        if remaining.is_zero() {
            break;
        }
        let take = remaining.min(lot.number.abs());
        remaining -= take;
        consumed.push(Consumption {
            units: Amount::new(take * sign, lot.currency.clone()),
            cost: lot.cost,
        });
    }

    if remaining > Decimal::ZERO {
        Err(BookingErrorKind::InsufficientLots(remaining))
    } else {
        Ok(consumed)
    }
}

/// STRICT: exactly one candidate, with two escape hatches. A reduction
/// equal to the candidates' total consumes all of them; with
/// `size_breaks_ties`, an exact-size candidate wins (oldest first).
fn resolve_strict(
    units: &Amount,
    lots: &[Lot],
    size_breaks_ties: bool,
) -> Result<Vec<Consumption>, BookingErrorKind> {
    match lots {
        [] => Err(BookingErrorKind::NoMatchingLots),
        [lot] => {
            let requested = units.number.abs();
            if requested > lot.number.abs() {
                Err(BookingErrorKind::InsufficientLots(
                    requested - lot.number.abs(),
                ))
            } else {
                Ok(vec![Consumption {
                    units: units.clone(),
                    cost: lot.cost.clone(),
                }])
            }
        }
        _ => {
            if size_breaks_ties {
                let mut exact: Vec<&Lot> = lots
                    .iter()
                    .filter(|lot| lot.number.abs() == units.number.abs())
                    .collect();
                exact.sort_by_key(|lot| lot.cost.date);
                if let Some(lot) = exact.first() {
                    return Ok(vec![Consumption {
                        units: units.clone(),
                        cost: lot.cost.clone(),
                    }]);
                }
            }
            // The total-match exception: consuming every candidate
            // exactly is unambiguous.
            let total: Decimal = lots.iter().map(|lot| lot.number).sum();
            if total == -units.number {
                let sign = units.number.signum();
                Ok(lots
                    .iter()
                    .map(|lot| Consumption {
                        units: Amount::new(lot.number.abs() * sign, lot.currency.clone()),
                        cost: lot.cost.clone(),
                    })
                    .collect())
            } else {
                Err(BookingErrorKind::AmbiguousMatches(lots.len()))
            }
        }
    }
}

/// Rewrite the reducing posting with its resolved consumptions.
///
/// The first consumption replaces the posting's own units and binds its
/// cost; further consumptions become cloned postings. Returns the extra
/// postings.
pub(crate) fn apply_consumptions(posting: &mut Posting, consumed: Vec<Consumption>) -> Vec<Posting> {
    let mut extra = Vec::new();
    let template = posting.clone();
    for (index, consumption) in consumed.into_iter().enumerate() {
        if index == 0 {
            posting.units = consumption.units.into();
            posting.cost = Some(CostBasis::Bound(consumption.cost));
        } else {
            let mut clone = template.clone();
            clone.units = consumption.units.into();
            clone.cost = Some(CostBasis::Bound(consumption.cost));
            extra.push(clone);
        }
    }
    extra
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn lot(number: Decimal, cost: Decimal, y: i32, m: u32, d: u32) -> Lot {
        Lot {
            number,
            currency: "HOOL".into(),
            cost: Cost::new(cost, "USD", date(y, m, d)),
        }
    }

    fn hool(number: Decimal) -> Amount {
        Amount::new(number, "HOOL")
    }

    #[test]
    fn test_fifo_consumes_oldest_first() {
        let lots = vec![
            lot(dec!(10), dec!(120), 2024, 2, 1),
            lot(dec!(10), dec!(100), 2024, 1, 1),
        ];
        let consumed = resolve_reduction(Booking::Fifo, &hool(dec!(-15)), lots).unwrap();
        assert_eq!(consumed.len(), 2);
        assert_eq!(consumed[0].units.number, dec!(-10));
        assert_eq!(consumed[0].cost.number, dec!(100));
        assert_eq!(consumed[1].units.number, dec!(-5));
        assert_eq!(consumed[1].cost.number, dec!(120));
    }

    #[test]
    fn test_lifo_consumes_newest_first() {
        let lots = vec![
            lot(dec!(10), dec!(100), 2024, 1, 1),
            lot(dec!(10), dec!(120), 2024, 2, 1),
        ];
        let consumed = resolve_reduction(Booking::Lifo, &hool(dec!(-15)), lots).unwrap();
        assert_eq!(consumed[0].cost.number, dec!(120));
        assert_eq!(consumed[1].cost.number, dec!(100));
        assert_eq!(consumed[1].units.number, dec!(-5));
    }

    #[test]
    fn test_hifo_consumes_priciest_first() {
        let lots = vec![
            lot(dec!(10), dec!(100), 2024, 1, 1),
            lot(dec!(10), dec!(150), 2024, 3, 1),
            lot(dec!(10), dec!(120), 2024, 2, 1),
        ];
        let consumed = resolve_reduction(Booking::Hifo, &hool(dec!(-25)), lots).unwrap();
        let costs: Vec<Decimal> = consumed.iter().map(|c| c.cost.number).collect();
        assert_eq!(costs, vec![dec!(150), dec!(120), dec!(100)]);
        assert_eq!(consumed[2].units.number, dec!(-5));
    }

    #[test]
    fn test_ordered_insufficient() {
        let lots = vec![lot(dec!(10), dec!(100), 2024, 1, 1)];
        let error = resolve_reduction(Booking::Fifo, &hool(dec!(-15)), lots).unwrap_err();
        assert_eq!(error, BookingErrorKind::InsufficientLots(dec!(5)));
    }

    #[test]
    fn test_strict_single_lot() {
        let lots = vec![lot(dec!(10), dec!(100), 2024, 1, 1)];
        let consumed = resolve_reduction(Booking::Strict, &hool(dec!(-4)), lots).unwrap();
        assert_eq!(consumed.len(), 1);
        assert_eq!(consumed[0].units.number, dec!(-4));
    }

    #[test]
    fn test_strict_no_match() {
        let error = resolve_reduction(Booking::Strict, &hool(dec!(-4)), vec![]).unwrap_err();
        assert_eq!(error, BookingErrorKind::NoMatchingLots);
    }

    #[test]
    fn test_strict_ambiguous() {
        let lots = vec![
            lot(dec!(10), dec!(100), 2024, 1, 1),
            lot(dec!(10), dec!(120), 2024, 2, 1),
        ];
        let error = resolve_reduction(Booking::Strict, &hool(dec!(-4)), lots).unwrap_err();
        assert_eq!(error, BookingErrorKind::AmbiguousMatches(2));
    }

    #[test]
    fn test_strict_total_match_exception() {
        let lots = vec![
            lot(dec!(10), dec!(100), 2024, 1, 1),
            lot(dec!(10), dec!(120), 2024, 2, 1),
        ];
        let consumed = resolve_reduction(Booking::Strict, &hool(dec!(-20)), lots).unwrap();
        assert_eq!(consumed.len(), 2);
        assert_eq!(consumed[0].units.number, dec!(-10));
        assert_eq!(consumed[1].units.number, dec!(-10));
    }

    #[test]
    fn test_strict_with_size_picks_oldest_exact_match() {
        let lots = vec![
            lot(dec!(10), dec!(120), 2024, 2, 1),
            lot(dec!(4), dec!(100), 2024, 1, 1),
            lot(dec!(4), dec!(90), 2024, 3, 1),
        ];
        let consumed =
            resolve_reduction(Booking::StrictWithSize, &hool(dec!(-4)), lots).unwrap();
        assert_eq!(consumed.len(), 1);
        assert_eq!(consumed[0].cost.number, dec!(100));
    }

    #[test]
    fn test_strict_with_size_without_exact_match_stays_ambiguous() {
        let lots = vec![
            lot(dec!(10), dec!(120), 2024, 2, 1),
            lot(dec!(8), dec!(100), 2024, 1, 1),
        ];
        let error =
            resolve_reduction(Booking::StrictWithSize, &hool(dec!(-4)), lots).unwrap_err();
        assert_eq!(error, BookingErrorKind::AmbiguousMatches(2));
    }

    #[test]
    fn test_apply_consumptions_splits_posting() {
        let mut posting = Posting::new("Assets:Stock", hool(dec!(-15))).with_cost(
            tally_core::CostSpec::empty().with_currency("USD"),
        );
        let consumed = vec![
            Consumption {
                units: hool(dec!(-10)),
                cost: Cost::new(dec!(100), "USD", date(2024, 1, 1)),
            },
            Consumption {
                units: hool(dec!(-5)),
                cost: Cost::new(dec!(120), "USD", date(2024, 2, 1)),
            },
        ];

        let extra = apply_consumptions(&mut posting, consumed);
        assert_eq!(extra.len(), 1);
        assert_eq!(posting.amount(), Some(hool(dec!(-10))));
        assert!(matches!(posting.cost, Some(CostBasis::Bound(_))));
        assert_eq!(extra[0].amount(), Some(hool(dec!(-5))));
        assert_eq!(extra[0].account, posting.account);
    }
}
