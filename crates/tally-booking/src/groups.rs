//! Categorizing postings into currency buckets.
//!
//! Every posting contributes its weight in exactly one currency: the cost
//! currency when known, else the price currency, else the units currency.
//! This module groups a transaction's postings by that bucket currency,
//! filling in currencies that can be deduced along the way, and copies a
//! single auto-posting (no units, no cost, no price) into every bucket so
//! it can absorb each bucket's residual.

use tally_core::{Account, Currency, Inventory, LedgerError, Posting};
use std::collections::HashMap;

use crate::error::BookingErrorKind;

pub(crate) type AccountBalances = HashMap<Account, Inventory>;
pub(crate) type GroupedPostings = Vec<(Currency, Vec<Posting>)>;

/// The currency whose bucket this posting belongs to, if decidable from
/// the posting alone.
fn bucket_currency(posting: &Posting) -> Option<&Currency> {
    if let Some(currency) = posting.cost.as_ref().and_then(|cost| cost.currency()) {
        return Some(currency);
    }
    if let Some(currency) = posting.price.as_ref().and_then(|price| price.currency()) {
        return Some(currency);
    }
    if posting.cost.is_none() && posting.price.is_none() {
        return posting.units.currency.as_ref();
    }
    None
}

/// Whether this posting is an auto-posting that absorbs residuals.
fn is_auto_posting(posting: &Posting) -> bool {
    posting.units.number.is_none()
        && posting.units.currency.is_none()
        && posting.cost.is_none()
        && posting.price.is_none()
}

/// After grouping, every currency a posting mentions must be resolved.
fn check_currencies_resolved(posting: &Posting) -> Result<(), LedgerError> {
    if posting.units.currency.is_none() {
        return Err(BookingErrorKind::UnresolvedUnitsCurrency.at_posting(posting));
    }
    if posting.price.as_ref().is_some_and(|p| p.currency().is_none()) {
        return Err(BookingErrorKind::UnresolvedPriceCurrency.at_posting(posting));
    }
    if posting.cost.as_ref().is_some_and(|c| c.currency().is_none()) {
        return Err(BookingErrorKind::UnresolvedCostCurrency.at_posting(posting));
    }
    Ok(())
}

fn push_to_group(groups: &mut GroupedPostings, currency: &Currency, posting: Posting) {
    if let Some((_, group)) = groups.iter_mut().find(|(c, _)| c == currency) {
        group.push(posting);
    } else {
        groups.push((currency.clone(), vec![posting]));
    }
}

/// Group a transaction's postings by bucket currency.
///
/// Fills deducible currencies: a cost and price on the same posting absorb
/// each other's currency; a single undetermined posting joins a sole
/// existing bucket; otherwise a missing cost currency is taken from the
/// account's running balance when that leaves no doubt. At most one
/// auto-posting is allowed; it is copied into every bucket.
pub(crate) fn group_postings(
    postings: &[Posting],
    balances: &AccountBalances,
) -> Result<GroupedPostings, LedgerError> {
    let mut auto_posting: Option<Posting> = None;
    let mut groups: GroupedPostings = Vec::new();
    let mut undetermined: Vec<Posting> = Vec::new();

    for mut posting in postings.iter().cloned() {
        // A cost and a price on one posting share a bucket; one known
        // currency determines the other.
        if let (Some(cost), Some(price)) = (&mut posting.cost, &mut posting.price) {
            if let tally_core::CostBasis::Incomplete(spec) = cost {
                match (&spec.currency, price.currency()) {
                    (Some(cost_currency), None) => {
                        price.amount_mut().currency = Some(cost_currency.clone());
                    }
                    (None, Some(price_currency)) => {
                        spec.currency = Some(price_currency.clone());
                    }
                    _ => {}
                }
            }
        }

        if is_auto_posting(&posting) {
            if auto_posting.is_some() {
                return Err(BookingErrorKind::TooManyMissingNumbers.at_posting(&posting));
            }
            auto_posting = Some(posting);
        } else if let Some(currency) = bucket_currency(&posting) {
            let currency = currency.clone();
            check_currencies_resolved(&posting)?;
            push_to_group(&mut groups, &currency, posting);
        } else {
            undetermined.push(posting);
        }
    }

    // A single undetermined posting alongside a single bucket belongs to
    // that bucket.
    if undetermined.len() == 1 && groups.len() == 1 {
        let mut posting = undetermined.pop().expect("length checked");
        let currency = groups[0].0.clone();
        match (&mut posting.cost, &mut posting.price) {
            (None, None) => posting.units.currency = Some(currency.clone()),
            (Some(cost), None) => {
                if let tally_core::CostBasis::Incomplete(spec) = cost {
                    spec.currency = Some(currency.clone());
                }
            }
            (None, Some(price)) => price.amount_mut().currency = Some(currency.clone()),
            (Some(cost), Some(price)) => {
                if let tally_core::CostBasis::Incomplete(spec) = cost {
                    spec.currency = Some(currency.clone());
                }
                price.amount_mut().currency = Some(currency.clone());
            }
        }
        check_currencies_resolved(&posting)?;
        groups[0].1.push(posting);
    } else {
        // Otherwise a missing cost currency can still come from the
        // account's existing lots, when they leave exactly one choice.
        for mut posting in undetermined {
            if let Some(tally_core::CostBasis::Incomplete(spec)) = &mut posting.cost {
                if spec.currency.is_none() {
                    if let Some(balance) = balances.get(&posting.account) {
                        let candidates = balance.cost_currencies();
                        if candidates.len() == 1 {
                            spec.currency = Some(candidates[0].clone());
                        }
                    }
                }
            }
            check_currencies_resolved(&posting)?;
            let currency = bucket_currency(&posting)
                .expect("currencies resolved above")
                .clone();
            push_to_group(&mut groups, &currency, posting);
        }
    }

    if let Some(auto_posting) = auto_posting {
        for (currency, group) in &mut groups {
            let mut copy = auto_posting.clone();
            copy.units.currency = Some(currency.clone());
            group.push(copy);
        }
    }

    Ok(groups)
}
