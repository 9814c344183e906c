//! Pad processing: synthesizing transactions so balance assertions hold.
//!
//! A `pad` directive asks for an automatic transfer from a source account
//! so that the *next* balance assertion on the padded account passes. For
//! each padded account we keep a running balance (postings on descendant
//! accounts roll up), remember the most recent pad, and when an assertion
//! would fail, insert a flag-`P` transaction dated at the pad. Each pad
//! pads a given currency at most once, and a pad that never inserts
//! anything is reported as unused.

use std::collections::{HashMap, HashSet};

use tally_core::{
    sort_entries, Account, Amount, BalanceAssertion, CostBasis, Currency, Directive, ErrorCategory,
    Inventory, LedgerError, Options, Pad, Posting, Transaction,
};

use crate::tolerance::balance_tolerance;

/// The flag carried by synthesized padding transactions.
const PADDING_FLAG: char = 'P';

/// Running pad state for one padded account.
struct AccountPadder<'opts> {
    options: &'opts Options,
    /// The most recent pad directive, with its index into `pads`.
    active_pad: Option<(usize, Pad)>,
    /// Pads seen for this account, with whether each inserted anything.
    pads: Vec<(Pad, bool)>,
    /// Currencies already padded under the active pad.
    padded_currencies: HashSet<Currency>,
    /// The running balance, lots included.
    balance: Inventory,
    /// Synthesized padding transactions.
    new_entries: Vec<Directive>,
    /// Errors from padding this account.
    errors: Vec<LedgerError>,
}

impl<'opts> AccountPadder<'opts> {
    fn new(options: &'opts Options) -> Self {
        Self {
            options,
            active_pad: None,
            pads: Vec::new(),
            padded_currencies: HashSet::new(),
            balance: Inventory::new(),
            new_entries: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn add_posting(&mut self, posting: &Posting) {
        if let Some(units) = posting.amount() {
            let cost = posting.cost.as_ref().and_then(CostBasis::bound).cloned();
            self.balance.add_amount(units, cost);
        }
    }

    fn begin_pad(&mut self, pad: &Pad) {
        self.pads.push((pad.clone(), false));
        self.active_pad = Some((self.pads.len() - 1, pad.clone()));
        self.padded_currencies.clear();
    }

    fn check_balance(&mut self, assertion: &BalanceAssertion) {
        let currency = &assertion.amount.currency;
        let current = self.balance.units(currency);
        let diff = current - assertion.amount.number;
        let padded_already = !self.padded_currencies.insert(currency.clone());

        let Some((pad_index, pad)) = self.active_pad.clone() else {
            return;
        };
        if padded_already || diff.abs() <= balance_tolerance(assertion, self.options) {
            return;
        }

        // Padding has no way to assign a cost basis; an account holding
        // lots of the asserted currency cannot be padded.
        let holds_lots = self
            .balance
            .iter_lots()
            .any(|lot| lot.currency == currency);
        if holds_lots {
            self.errors.push(
                LedgerError::new(
                    ErrorCategory::Pad,
                    format!(
                        "Cannot pad account '{}' holding {} positions at cost",
                        pad.account, currency
                    ),
                )
                .at(pad.meta.filename.clone(), pad.meta.lineno),
            );
            return;
        }

        let correction = Amount::new(-diff, currency.clone());
        let txn = Transaction::new(
            pad.date,
            format!(
                "(Padding inserted for Balance of {} for difference {})",
                assertion.amount, correction
            ),
        )
        .with_flag(PADDING_FLAG)
        .with_meta(pad.meta.clone())
        .with_posting(
            Posting::new(pad.account.clone(), correction.clone()).with_meta(pad.meta.clone()),
        )
        .with_posting(
            Posting::new(pad.source_account.clone(), -&correction).with_meta(pad.meta.clone()),
        );

        self.balance.add_amount(correction, None);
        self.new_entries.push(Directive::Transaction(txn));
        self.pads[pad_index].1 = true;
    }

    fn finish(mut self) -> (Vec<Directive>, Vec<LedgerError>) {
        for (pad, used) in &self.pads {
            if !used {
                self.errors.push(
                    LedgerError::new(
                        ErrorCategory::Pad,
                        format!("Unused Pad directive for account '{}'", pad.account),
                    )
                    .at(pad.meta.filename.clone(), pad.meta.lineno),
                );
            }
        }
        (self.new_entries, self.errors)
    }
}

/// Insert padding transactions for every pad directive in the stream.
///
/// `entries` must be sorted; synthesized transactions are spliced in next
/// to their pad and the stream is re-sorted. Returns the pad errors.
pub fn process_pads(entries: &mut Vec<Directive>, options: &Options) -> Vec<LedgerError> {
    let padded_accounts: HashSet<Account> = entries
        .iter()
        .filter_map(|entry| match entry {
            Directive::Pad(pad) => Some(pad.account.clone()),
            _ => None,
        })
        .collect();
    if padded_accounts.is_empty() {
        return Vec::new();
    }

    let mut padders: HashMap<Account, AccountPadder<'_>> = padded_accounts
        .into_iter()
        .map(|account| (account, AccountPadder::new(options)))
        .collect();
    // Per posting account, the padded ancestors it rolls up into.
    let mut padded_ancestors: HashMap<Account, Vec<Account>> = HashMap::new();

    for entry in entries.iter() {
        match entry {
            Directive::Transaction(txn) => {
                for posting in &txn.postings {
                    let ancestors = padded_ancestors
                        .entry(posting.account.clone())
                        .or_insert_with(|| {
                            posting
                                .account
                                .parents()
                                .filter(|ancestor| padders.contains_key(ancestor))
                                .collect()
                        });
                    for ancestor in ancestors {
                        padders
                            .get_mut(ancestor)
                            .expect("padders initialized for all padded accounts")
                            .add_posting(posting);
                    }
                }
            }
            Directive::Pad(pad) => {
                padders
                    .get_mut(&pad.account)
                    .expect("padders initialized for all padded accounts")
                    .begin_pad(pad);
            }
            Directive::Balance(assertion) => {
                if let Some(padder) = padders.get_mut(&assertion.account) {
                    padder.check_balance(assertion);
                }
            }
            _ => {}
        }
    }

    let mut all_errors = Vec::new();
    let mut sorted_padders: Vec<(Account, AccountPadder<'_>)> = padders.into_iter().collect();
    sorted_padders.sort_by(|a, b| a.0.cmp(&b.0));
    for (_, padder) in sorted_padders {
        let (new_entries, errors) = padder.finish();
        entries.extend(new_entries);
        all_errors.extend(errors);
    }
    sort_entries(entries);

    all_errors
}
