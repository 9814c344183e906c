//! Residual interpolation: solving the one missing number per bucket.
//!
//! After reductions are booked, each currency group may contain at most
//! one posting with a missing value (units number, per-unit cost, or
//! price). The group's residual determines that value; everything else is
//! bound to concrete amounts and costs.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use tally_core::{
    Amount, Cost, CostBasis, Currency, LedgerError, Posting, PriceAnnotation,
};

use crate::error::BookingErrorKind;
use crate::tolerance::Tolerances;

/// Which value a posting is missing, with everything already resolved
/// carried along.
enum Missing {
    /// All values present.
    None(Amount, Option<Amount>, Option<Cost>),
    /// The units number; price and cost are known.
    Units(Option<Amount>, Option<Cost>),
    /// The per-unit cost; units and price are known.
    CostPerUnit(Amount, Option<Amount>),
    /// The price number; units and cost are known.
    Price(Amount, Option<Cost>),
}

/// The weight a completed posting contributes to its group's residual:
/// `units × cost` in the cost currency when a cost is present, else
/// `units × price` in the price currency, else the units themselves.
fn weight_of(units: &Amount, price: Option<&Amount>, cost: Option<&Cost>) -> Amount {
    if let Some(cost) = cost {
        Amount::new(cost.number * units.number, cost.currency.clone())
    } else if let Some(price) = price {
        Amount::new(price.number * units.number, price.currency.clone())
    } else {
        units.clone()
    }
}

/// Resolve a price annotation to a per-unit amount, given the units when
/// known. Total prices divide by the unit count.
fn per_unit_price(
    price: &PriceAnnotation,
    units_number: Option<Decimal>,
) -> Result<Amount, ()> {
    let incomplete = price.amount();
    let currency = incomplete.currency.clone().ok_or(())?;
    let number = incomplete.number.ok_or(())?;
    match price {
        PriceAnnotation::Unit(_) => Ok(Amount::new(number, currency)),
        PriceAnnotation::Total(_) => {
            let units = units_number.ok_or(())?.abs();
            if units.is_zero() {
                return Err(());
            }
            Ok(Amount::new(number / units, currency))
        }
    }
}

/// Classify what a posting is missing, binding its cost spec on the way.
fn classify(posting: &Posting, date: NaiveDate) -> Result<Missing, BookingErrorKind> {
    let units = posting.units.complete();
    let price: Result<Option<Amount>, ()> = match &posting.price {
        None => Ok(None),
        Some(annotation) => {
            per_unit_price(annotation, posting.units.number).map(Some)
        }
    };
    let cost: Result<Option<Cost>, ()> = match &posting.cost {
        None => Ok(None),
        Some(CostBasis::Bound(cost)) => Ok(Some(cost.clone())),
        Some(CostBasis::Incomplete(spec)) => {
            spec.bind(posting.units.number, date).map(Some).ok_or(())
        }
    };

    match (units, price, cost) {
        (Some(units), Ok(price), Ok(cost)) => Ok(Missing::None(units, price, cost)),
        (None, Ok(price), Ok(cost)) => Ok(Missing::Units(price, cost)),
        (Some(units), Err(()), Ok(cost)) => Ok(Missing::Price(units, cost)),
        (Some(units), Ok(price), Err(())) => Ok(Missing::CostPerUnit(units, price)),
        _ => Err(BookingErrorKind::TooManyMissingNumbers),
    }
}

/// Replace a posting's partial fields with resolved values.
fn complete_posting(
    mut posting: Posting,
    units: Amount,
    price: Option<Amount>,
    cost: Option<Cost>,
) -> Posting {
    posting.units = units.into();
    posting.price = price.map(|amount| PriceAnnotation::Unit(amount.into()));
    posting.cost = cost.map(CostBasis::Bound);
    posting
}

/// Interpolate and bind one currency group.
///
/// At most one posting may be missing a value; it is solved so the
/// group's residual in `group_currency` becomes zero. A solved units
/// number of zero drops the posting, and a solved negative per-unit cost
/// is rejected.
pub(crate) fn interpolate_group(
    postings: Vec<Posting>,
    group_currency: &Currency,
    tolerances: &Tolerances,
    date: NaiveDate,
) -> Result<Vec<Posting>, LedgerError> {
    let mut incomplete: Option<(Posting, Missing)> = None;
    let mut completed = Vec::with_capacity(postings.len());

    for posting in postings {
        let missing = classify(&posting, date).map_err(|kind| kind.at_posting(&posting))?;
        if let Missing::None(units, price, cost) = missing {
            completed.push(complete_posting(posting, units, price, cost));
        } else {
            if incomplete.is_some() {
                return Err(BookingErrorKind::TooManyMissingNumbers.at_posting(&posting));
            }
            incomplete = Some((posting, missing));
        }
    }

    let Some((posting, missing)) = incomplete else {
        return Ok(completed);
    };

    // The residual of the completed siblings; the missing value must
    // cancel it out.
    let target = -completed
        .iter()
        .map(|p| {
            let units = p.amount().expect("posting was completed");
            let price = match &p.price {
                Some(PriceAnnotation::Unit(amount)) => amount.complete(),
                _ => None,
            };
            let cost = p.cost.as_ref().and_then(CostBasis::bound);
            let weight = weight_of(&units, price.as_ref(), cost);
            debug_assert_eq!(&weight.currency, group_currency);
            weight.number
        })
        .sum::<Decimal>();

    let resolved = match missing {
        Missing::Units(price, cost) => {
            if target.is_zero() {
                // A posting interpolated to zero units carries nothing;
                // drop it.
                None
            } else {
                let number = if let Some(cost) = &cost {
                    target / cost.number
                } else if let Some(price) = &price {
                    target / price.number
                } else {
                    target
                };
                let currency = posting
                    .units
                    .currency
                    .clone()
                    .unwrap_or_else(|| group_currency.clone());
                let number = tolerances.quantize(&currency, number);
                Some((Amount::new(number, currency), price, cost))
            }
        }
        Missing::CostPerUnit(units, price) => {
            if units.number.is_zero() {
                None
            } else {
                let per_unit = target / units.number;
                if per_unit < Decimal::ZERO {
                    return Err(
                        BookingErrorKind::NegativeCost(per_unit).at_posting(&posting)
                    );
                }
                let Some(CostBasis::Incomplete(spec)) = &posting.cost else {
                    return Err(BookingErrorKind::IncompleteAfterBooking.at_posting(&posting));
                };
                let mut spec = spec.clone();
                spec.number_per = Some(per_unit);
                let cost = spec
                    .bind(Some(units.number), date)
                    .ok_or_else(|| BookingErrorKind::IncompleteAfterBooking.at_posting(&posting))?;
                Some((units, price, Some(cost)))
            }
        }
        Missing::Price(units, cost) => {
            if units.number.is_zero() {
                None
            } else {
                let price = Amount::new(target / units.number, group_currency.clone());
                Some((units, Some(price), cost))
            }
        }
        Missing::None(..) => unreachable!("complete postings were drained above"),
    };

    if let Some((units, price, cost)) = resolved {
        completed.push(complete_posting(posting, units, price, cost));
    }

    Ok(completed)
}
