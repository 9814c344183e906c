//! The tally booking engine.
//!
//! Booking turns parsed transactions with partial postings into fully
//! resolved ones. For each transaction, in date order:
//!
//! 1. postings are categorized into currency buckets ([`groups`]),
//! 2. reducing postings are matched against the account's lots under its
//!    booking method ([`methods`]),
//! 3. the remaining missing value per bucket is interpolated from the
//!    residual ([`interpolate`]),
//!
//! with tolerances inferred from the input's own precision
//! ([`tolerance`]). Failed transactions are dropped from the booked
//! stream and surface as errors. Pad processing ([`pad`]) runs on the
//! booked stream.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod groups;
mod interpolate;
mod methods;
pub mod pad;
pub mod tolerance;

pub use error::BookingErrorKind;
pub use pad::process_pads;
pub use tolerance::{balance_tolerance, Tolerances};

use std::collections::HashMap;

use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use tally_core::{
    Account, Amount, Booking, CostBasis, Currency, Directive, Inventory, LedgerError, Options,
    Posting, PriceAnnotation, Transaction,
};

use groups::{group_postings, AccountBalances};
use interpolate::interpolate_group;
use methods::{apply_consumptions, resolve_reduction, Lot};

/// The outcome of booking an entry stream.
#[derive(Debug)]
pub struct BookingResult {
    /// The stream with transactions fully booked; failed transactions are
    /// omitted.
    pub entries: Vec<Directive>,
    /// Errors from transactions that could not be booked.
    pub errors: Vec<LedgerError>,
}

/// Per-account booking methods, collected from Open directives.
struct BookingMethods {
    map: HashMap<Account, Booking>,
    default: Booking,
}

impl BookingMethods {
    fn collect(entries: &[Directive], options: &Options) -> Self {
        let mut map = HashMap::new();
        for entry in entries {
            if let Directive::Open(open) = entry {
                if let Some(method) = open.booking {
                    map.insert(open.account.clone(), method);
                }
            }
        }
        Self {
            map,
            default: options.booking_method,
        }
    }

    fn get(&self, account: &Account) -> Booking {
        self.map.get(account).copied().unwrap_or(self.default)
    }
}

/// The weight a booked posting contributes to its transaction's residual.
///
/// Weight is `units × cost` in the cost currency, else `units × price` in
/// the price currency, else the units. Returns `None` for postings whose
/// units are still incomplete.
#[must_use]
pub fn weight(posting: &Posting) -> Option<Amount> {
    let units = posting.units.complete()?;
    if let Some(cost) = posting.cost.as_ref().and_then(CostBasis::bound) {
        return Some(Amount::new(cost.number * units.number, cost.currency.clone()));
    }
    if let Some(annotation) = &posting.price {
        if let Some(price) = annotation.amount().complete() {
            let number = match annotation {
                PriceAnnotation::Unit(_) => price.number * units.number,
                PriceAnnotation::Total(_) => price.number * units.number.signum(),
            };
            return Some(Amount::new(number, price.currency));
        }
    }
    Some(units)
}

/// The per-currency residual of a transaction: the sum of its postings'
/// weights. A balanced transaction's residual is empty or within
/// tolerance.
#[must_use]
pub fn residual(transaction: &Transaction) -> Inventory {
    transaction.postings.iter().filter_map(weight).collect()
}

/// Book every transaction in the stream.
///
/// `entries` must already be sorted. Transactions are booked against
/// running per-account balances built up along the way; a transaction
/// that fails to book contributes an error instead of entries.
#[must_use]
pub fn book(entries: Vec<Directive>, options: &Options) -> BookingResult {
    let booking_methods = BookingMethods::collect(&entries, options);
    let mut balances = AccountBalances::new();
    let mut booked = Vec::with_capacity(entries.len());
    let mut errors = Vec::new();

    for entry in entries {
        match entry {
            Directive::Transaction(txn) => {
                match book_transaction(&balances, txn, &booking_methods, options) {
                    Ok(txn) => {
                        apply_to_balances(&mut balances, &txn, &booking_methods);
                        booked.push(Directive::Transaction(txn));
                    }
                    Err(error) => errors.push(error),
                }
            }
            other => booked.push(other),
        }
    }

    BookingResult {
        entries: booked,
        errors,
    }
}

/// Book one transaction against the current balances.
fn book_transaction(
    balances: &AccountBalances,
    txn: Transaction,
    methods: &BookingMethods,
    options: &Options,
) -> Result<Transaction, LedgerError> {
    check_self_reduction(&txn)?;

    let tolerances = Tolerances::infer(&txn.postings, options);
    let groups = group_postings(&txn.postings, balances)?;

    let mut postings = Vec::with_capacity(txn.postings.len());
    for (currency, mut group) in groups {
        book_reductions(balances, &mut group, methods)?;
        postings.extend(interpolate_group(group, &currency, &tolerances, txn.date)?);
    }
    postings.sort_by_key(|posting| posting.meta.lineno);

    let mut txn = txn;
    txn.postings = postings;
    ensure_complete(&txn)?;
    Ok(txn)
}

/// Within one transaction, at-cost postings on the same (account,
/// currency) must not both augment and reduce.
fn check_self_reduction(txn: &Transaction) -> Result<(), LedgerError> {
    let mut signs: HashMap<(&Account, &Currency), Decimal> = HashMap::new();
    for posting in &txn.postings {
        if posting.cost.is_none() {
            continue;
        }
        let (Some(number), Some(currency)) = (&posting.units.number, &posting.units.currency)
        else {
            continue;
        };
        if number.is_zero() {
            continue;
        }
        let sign = number.signum();
        let key = (&posting.account, currency);
        if let Some(seen) = signs.get(&key) {
            if *seen != sign {
                return Err(BookingErrorKind::SelfReduction {
                    account: posting.account.clone(),
                    currency: currency.clone(),
                }
                .at_posting(posting));
            }
        } else {
            signs.insert(key, sign);
        }
    }
    Ok(())
}

/// Book the reducing postings of one currency group against the accounts'
/// lots.
///
/// Works on local copies of the touched balances so a failure halfway
/// through a transaction leaves the running balances untouched.
fn book_reductions(
    balances: &AccountBalances,
    postings: &mut Vec<Posting>,
    methods: &BookingMethods,
) -> Result<(), LedgerError> {
    let mut extra_postings = Vec::new();
    let mut local: AccountBalances = AccountBalances::new();

    for posting in postings.iter_mut() {
        let Some(cost) = &posting.cost else {
            continue;
        };
        let (Some(number), Some(currency)) = (posting.units.number, &posting.units.currency)
        else {
            continue;
        };
        let method = methods.get(&posting.account);
        if method == Booking::None {
            continue;
        }

        let balance = local.entry(posting.account.clone()).or_insert_with(|| {
            balances
                .get(&posting.account)
                .cloned()
                .unwrap_or_default()
        });
        let units = Amount::new(number, currency.clone());
        if !balance.is_reduced_by(&units) {
            continue;
        }

        if method == Booking::Average {
            collapse_to_average(balance, &units.currency);
        }

        let matcher = match cost {
            CostBasis::Incomplete(spec) => spec.clone(),
            CostBasis::Bound(bound) => bound.into(),
        };
        let lots: Vec<Lot> = balance
            .iter_lots()
            .filter(|lot| lot.currency == &units.currency && matcher.matches(lot.cost))
            .map(|lot| Lot {
                number: *lot.number,
                currency: lot.currency.clone(),
                cost: lot.cost.clone(),
            })
            .collect();
        if lots.is_empty() {
            return Err(BookingErrorKind::NoMatchingLots.at_posting(posting));
        }

        let consumed = resolve_reduction(method, &units, lots)
            .map_err(|kind| kind.at_posting(posting))?;
        for consumption in &consumed {
            balance.add_amount(consumption.units.clone(), Some(consumption.cost.clone()));
        }
        extra_postings.extend(apply_consumptions(posting, consumed));
    }

    postings.append(&mut extra_postings);
    Ok(())
}

/// Replace an account's lots in one currency with their average.
fn collapse_to_average(balance: &mut Inventory, currency: &Currency) {
    let lots: Vec<(Amount, tally_core::Cost)> = balance
        .iter_lots()
        .filter(|lot| lot.currency == currency)
        .map(|lot| (Amount::new(*lot.number, lot.currency.clone()), lot.cost.clone()))
        .collect();
    if lots.len() < 2 {
        return;
    }

    let mut removed = Inventory::new();
    for (units, cost) in &lots {
        balance.add_amount(-units, Some(cost.clone()));
        removed.add_amount(units.clone(), Some(cost.clone()));
    }
    balance.add_inventory(&removed.average());
}

/// After booking, nothing may remain missing or unbound.
fn ensure_complete(txn: &Transaction) -> Result<(), LedgerError> {
    for posting in &txn.postings {
        let units_complete = posting.units.is_complete();
        let cost_bound = match &posting.cost {
            None | Some(CostBasis::Bound(_)) => true,
            Some(CostBasis::Incomplete(_)) => false,
        };
        let price_complete = match &posting.price {
            None => true,
            Some(annotation) => annotation.amount().is_complete(),
        };
        if !(units_complete && cost_bound && price_complete) {
            return Err(BookingErrorKind::IncompleteAfterBooking.at_posting(posting));
        }
    }
    Ok(())
}

/// Apply a booked transaction's postings to the running balances.
///
/// Accounts booked AVERAGE keep their whole inventory collapsed, so later
/// reductions always see merged lots.
fn apply_to_balances(balances: &mut AccountBalances, txn: &Transaction, methods: &BookingMethods) {
    for posting in &txn.postings {
        if let Some(units) = posting.amount() {
            let cost = posting.cost.as_ref().and_then(CostBasis::bound).cloned();
            let balance = balances.entry(posting.account.clone()).or_default();
            balance.add_amount(units, cost);
            if methods.get(&posting.account) == Booking::Average {
                *balance = balance.average();
            }
        }
    }
}
