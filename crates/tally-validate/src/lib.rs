//! Validation: the accounting invariant checks.
//!
//! Each check is a pure pass over the booked, sorted entry stream that
//! reports violations as errors; none of them throws, and all of them run
//! so a single load surfaces as many problems as possible:
//!
//! - account names are well-formed and rooted in a configured type
//! - accounts are opened before use, closed at most once, and not used
//!   after closing (balance assertions, notes and documents excepted)
//! - balance assertions do not contradict each other, and hold against
//!   the accumulated balance (failing ones get their difference attached)
//! - commodities are declared at most once
//! - currency constraints from Open directives hold
//! - transactions balance within inferred tolerance

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

use tally_booking::{balance_tolerance, residual, Tolerances};
use tally_core::{
    Account, Amount, BalanceAssertion, CostBasis, Currency, Directive, ErrorCategory, Inventory,
    LedgerError, Options,
};

/// Run the full validation suite.
///
/// `entries` must be booked and sorted. Balance assertions that fail get
/// their observed difference attached, which is why the stream is taken
/// mutably; no entries are added or removed.
pub fn validate(entries: &mut [Directive], options: &Options) -> Vec<LedgerError> {
    let mut errors = Vec::new();
    errors.extend(check_account_names(entries, options));
    errors.extend(check_open_close(entries));
    errors.extend(check_duplicate_balances(entries));
    errors.extend(check_duplicate_commodities(entries));
    errors.extend(check_active_accounts(entries));
    errors.extend(check_currency_constraints(entries));
    errors.extend(check_transaction_balances(entries, options));
    errors.extend(check_balance_assertions(entries, options));
    errors
}

fn validation_error(message: String, entry: &Directive) -> LedgerError {
    LedgerError::new(ErrorCategory::Validation, message).with_entry(entry)
}

/// Account names start with a configured root and match the name syntax.
fn check_account_names(entries: &[Directive], options: &Options) -> Vec<LedgerError> {
    let mut errors = Vec::new();
    let mut seen: HashSet<&Account> = HashSet::new();

    for entry in entries {
        for account in entry.accounts() {
            if !seen.insert(account) {
                continue;
            }
            if !options.account_types.has_valid_root(account) {
                errors.push(validation_error(
                    format!("Invalid account name '{account}' (invalid root account)"),
                    entry,
                ));
            } else if !account.is_valid() {
                errors.push(validation_error(
                    format!("Invalid account name '{account}' (does not match valid pattern)"),
                    entry,
                ));
            }
        }
    }
    errors
}

/// Accounts open at most once and close at most once, after opening.
fn check_open_close(entries: &[Directive]) -> Vec<LedgerError> {
    let mut errors = Vec::new();
    let mut opened: HashMap<&Account, chrono::NaiveDate> = HashMap::new();
    let mut closed: HashSet<&Account> = HashSet::new();

    for entry in entries {
        match entry {
            Directive::Open(open) => {
                if opened.contains_key(&open.account) {
                    errors.push(validation_error(
                        format!("Duplicate open directive for account '{}'", open.account),
                        entry,
                    ));
                } else {
                    opened.insert(&open.account, open.date);
                }
            }
            Directive::Close(close) => {
                if closed.contains(&close.account) {
                    errors.push(validation_error(
                        format!("Duplicate close directive for account '{}'", close.account),
                        entry,
                    ));
                } else {
                    match opened.get(&close.account) {
                        None => errors.push(validation_error(
                            format!("Closing unopened account '{}'", close.account),
                            entry,
                        )),
                        Some(open_date) if close.date < *open_date => {
                            errors.push(validation_error(
                                format!(
                                    "Closing account '{}' before its opening date",
                                    close.account
                                ),
                                entry,
                            ));
                        }
                        Some(_) => {}
                    }
                    closed.insert(&close.account);
                }
            }
            _ => {}
        }
    }
    errors
}

/// Two balance assertions for the same (account, currency, date) must
/// agree; identical duplicates are allowed.
fn check_duplicate_balances(entries: &[Directive]) -> Vec<LedgerError> {
    let mut errors = Vec::new();
    let mut seen: HashMap<(&Account, chrono::NaiveDate, &Currency), &BalanceAssertion> =
        HashMap::new();

    for entry in entries {
        let Directive::Balance(assertion) = entry else {
            continue;
        };
        let key = (&assertion.account, assertion.date, &assertion.amount.currency);
        match seen.get(&key) {
            Some(previous) => {
                if previous.amount != assertion.amount {
                    errors.push(validation_error(
                        "Duplicate balance assertions with different amounts".to_string(),
                        entry,
                    ));
                }
            }
            None => {
                seen.insert(key, assertion);
            }
        }
    }
    errors
}

/// At most one commodity declaration per currency.
fn check_duplicate_commodities(entries: &[Directive]) -> Vec<LedgerError> {
    let mut errors = Vec::new();
    let mut seen: HashSet<&Currency> = HashSet::new();

    for entry in entries {
        if let Directive::Commodity(commodity) = entry {
            if !seen.insert(&commodity.currency) {
                errors.push(validation_error(
                    format!("Duplicate commodity directive for {}", commodity.currency),
                    entry,
                ));
            }
        }
    }
    errors
}

/// Every referenced account has a prior Open and no intervening Close;
/// balance assertions, notes and documents may follow a Close.
fn check_active_accounts(entries: &[Directive]) -> Vec<LedgerError> {
    let mut errors = Vec::new();
    let mut active: HashSet<&Account> = HashSet::new();
    let mut ever_opened: HashSet<&Account> = HashSet::new();

    for entry in entries {
        match entry {
            Directive::Open(open) => {
                active.insert(&open.account);
                ever_opened.insert(&open.account);
            }
            Directive::Close(close) => {
                active.remove(&close.account);
            }
            _ => {
                for account in entry.accounts() {
                    if active.contains(account) {
                        continue;
                    }
                    if ever_opened.contains(account) {
                        if !entry.allowed_after_close() {
                            errors.push(validation_error(
                                format!("Invalid reference to inactive account '{account}'"),
                                entry,
                            ));
                        }
                    } else {
                        errors.push(validation_error(
                            format!("Invalid reference to unknown account '{account}'"),
                            entry,
                        ));
                    }
                }
            }
        }
    }
    errors
}

/// Postings and assertions on an account use only the currencies its Open
/// whitelists.
fn check_currency_constraints(entries: &[Directive]) -> Vec<LedgerError> {
    let mut errors = Vec::new();
    let mut constraints: HashMap<&Account, &Vec<Currency>> = HashMap::new();

    for entry in entries {
        if let Directive::Open(open) = entry {
            if !open.currencies.is_empty() {
                constraints.insert(&open.account, &open.currencies);
            }
        }
    }

    for entry in entries {
        match entry {
            Directive::Transaction(txn) => {
                for posting in &txn.postings {
                    let Some(allowed) = constraints.get(&posting.account) else {
                        continue;
                    };
                    let Some(currency) = &posting.units.currency else {
                        continue;
                    };
                    if !allowed.contains(currency) {
                        errors.push(validation_error(
                            format!(
                                "Invalid currency '{currency}' for account '{}'",
                                posting.account
                            ),
                            entry,
                        ));
                    }
                }
            }
            Directive::Balance(assertion) => {
                if let Some(allowed) = constraints.get(&assertion.account) {
                    let currency = &assertion.amount.currency;
                    if !allowed.contains(currency) {
                        errors.push(validation_error(
                            format!(
                                "Invalid currency '{currency}' for account '{}'",
                                assertion.account
                            ),
                            entry,
                        ));
                    }
                }
            }
            _ => {}
        }
    }
    errors
}

/// Every transaction's residual is small under its inferred tolerance.
fn check_transaction_balances(entries: &[Directive], options: &Options) -> Vec<LedgerError> {
    let mut errors = Vec::new();
    for entry in entries {
        let Directive::Transaction(txn) = entry else {
            continue;
        };
        let tolerances = Tolerances::infer(&txn.postings, options);
        if !tolerances.is_small(&residual(txn)) {
            errors.push(validation_error(
                "Transaction does not balance".to_string(),
                entry,
            ));
        }
    }
    errors
}

/// Check balance assertions against the accumulated balances.
///
/// Postings on subaccounts roll up into assertions on their ancestors. A
/// failing assertion gets its observed difference attached and produces a
/// Balance error.
fn check_balance_assertions(entries: &mut [Directive], options: &Options) -> Vec<LedgerError> {
    let asserted: HashSet<Account> = entries
        .iter()
        .filter_map(|entry| match entry {
            Directive::Balance(assertion) => Some(assertion.account.clone()),
            _ => None,
        })
        .collect();
    if asserted.is_empty() {
        return Vec::new();
    }

    let mut balances: HashMap<Account, Inventory> = asserted
        .iter()
        .map(|account| (account.clone(), Inventory::new()))
        .collect();
    let mut asserted_ancestors: HashMap<Account, Vec<Account>> = HashMap::new();
    let mut errors = Vec::new();

    for entry in entries.iter_mut() {
        match entry {
            Directive::Transaction(txn) => {
                for posting in &txn.postings {
                    let Some(units) = posting.amount() else {
                        continue;
                    };
                    let cost = posting.cost.as_ref().and_then(CostBasis::bound).cloned();
                    let ancestors = asserted_ancestors
                        .entry(posting.account.clone())
                        .or_insert_with(|| {
                            posting
                                .account
                                .parents()
                                .filter(|ancestor| asserted.contains(ancestor))
                                .collect()
                        });
                    for ancestor in ancestors.iter() {
                        balances
                            .get_mut(ancestor)
                            .expect("balances initialized for asserted accounts")
                            .add_amount(units.clone(), cost.clone());
                    }
                }
            }
            Directive::Balance(assertion) => {
                let balance = balances
                    .get(&assertion.account)
                    .expect("balances initialized for asserted accounts");
                let accumulated = balance.units(&assertion.amount.currency);
                let diff = accumulated - assertion.amount.number;
                if diff.abs() > balance_tolerance(assertion, options) {
                    let direction = if diff > Decimal::ZERO {
                        format!("{diff} too much")
                    } else {
                        format!("{} too little", -diff)
                    };
                    let message = format!(
                        "Balance failed for '{}': expected {} != accumulated {} {} ({})",
                        assertion.account,
                        assertion.amount,
                        accumulated,
                        assertion.amount.currency,
                        direction,
                    );
                    assertion.diff =
                        Some(Amount::new(diff, assertion.amount.currency.clone()));
                    let located = LedgerError::new(ErrorCategory::Balance, message)
                        .at(assertion.meta.filename.clone(), assertion.meta.lineno);
                    errors.push(located);
                }
            }
            _ => {}
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tally_core::{
        sort_entries, Close, Commodity, Note, Open, Posting, Transaction,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn usd(n: Decimal) -> Amount {
        Amount::new(n, "USD")
    }

    fn txn(y: i32, m: u32, d: u32, account: &str, amount: Amount) -> Directive {
        Transaction::new(date(y, m, d), "test")
            .with_posting(Posting::new(account, amount.clone()))
            .with_posting(Posting::new("Equity:Opening", -&amount))
            .into()
    }

    fn run(mut entries: Vec<Directive>) -> Vec<String> {
        sort_entries(&mut entries);
        validate(&mut entries, &Options::default())
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    fn opens(accounts: &[&str]) -> Vec<Directive> {
        accounts
            .iter()
            .map(|account| Open::new(date(2023, 1, 1), *account).into())
            .collect()
    }

    #[test]
    fn test_clean_ledger_has_no_errors() {
        let mut entries = opens(&["Assets:Cash", "Equity:Opening"]);
        entries.push(txn(2023, 1, 2, "Assets:Cash", usd(dec!(10.00))));
        assert!(run(entries).is_empty());
    }

    #[test]
    fn test_invalid_account_names() {
        let entries = opens(&["Pension:Cash", "Assets:lower"]);
        let errors = run(entries);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("invalid root account"));
        assert!(errors[1].contains("does not match valid pattern"));
    }

    #[test]
    fn test_duplicate_open_and_close() {
        let mut entries = opens(&["Assets:Cash", "Assets:Cash"]);
        entries.push(Close::new(date(2023, 2, 1), "Assets:Cash").into());
        entries.push(Close::new(date(2023, 3, 1), "Assets:Cash").into());
        let errors = run(entries);
        assert!(errors.iter().any(|e| e.contains("Duplicate open")));
        assert!(errors.iter().any(|e| e.contains("Duplicate close")));
    }

    #[test]
    fn test_close_before_open() {
        let entries = vec![
            Open::new(date(2023, 5, 1), "Assets:Cash").into(),
            Close::new(date(2023, 1, 1), "Assets:Cash").into(),
        ];
        let errors = run(entries);
        assert!(errors.iter().any(|e| e.contains("before its opening date")));
    }

    #[test]
    fn test_closing_unopened_account() {
        let errors = run(vec![Close::new(date(2023, 1, 1), "Assets:Cash").into()]);
        assert!(errors.iter().any(|e| e.contains("Closing unopened")));
    }

    #[test]
    fn test_unknown_account_reference() {
        let mut entries = opens(&["Equity:Opening"]);
        entries.push(txn(2023, 1, 2, "Assets:Cash", usd(dec!(10.00))));
        let errors = run(entries);
        assert!(errors.iter().any(|e| e.contains("unknown account 'Assets:Cash'")));
    }

    #[test]
    fn test_closed_account_reference() {
        let mut entries = opens(&["Assets:Cash", "Equity:Opening"]);
        entries.push(Close::new(date(2023, 1, 5), "Assets:Cash").into());
        entries.push(txn(2023, 2, 1, "Assets:Cash", usd(dec!(10.00))));
        let errors = run(entries);
        assert!(errors.iter().any(|e| e.contains("inactive account 'Assets:Cash'")));
    }

    #[test]
    fn test_balance_and_note_allowed_after_close() {
        let mut entries = opens(&["Assets:Cash"]);
        entries.push(Close::new(date(2023, 1, 5), "Assets:Cash").into());
        entries.push(Note::new(date(2023, 2, 1), "Assets:Cash", "archived").into());
        entries.push(
            BalanceAssertion::new(date(2023, 2, 1), "Assets:Cash", usd(dec!(0))).into(),
        );
        assert!(run(entries).is_empty());
    }

    #[test]
    fn test_duplicate_balance_assertions() {
        let mut entries = opens(&["Assets:Cash"]);
        entries.push(BalanceAssertion::new(date(2023, 1, 2), "Assets:Cash", usd(dec!(0))).into());
        entries.push(BalanceAssertion::new(date(2023, 1, 2), "Assets:Cash", usd(dec!(0))).into());
        // Identical duplicates are fine.
        assert!(run(entries.clone()).is_empty());

        entries.push(
            BalanceAssertion::new(date(2023, 1, 2), "Assets:Cash", usd(dec!(5))).into(),
        );
        let errors = run(entries);
        assert!(errors.iter().any(|e| e.contains("different amounts")));
    }

    #[test]
    fn test_duplicate_commodities() {
        let entries = vec![
            Commodity::new(date(2023, 1, 1), "USD").into(),
            Commodity::new(date(2023, 1, 2), "USD").into(),
        ];
        let errors = run(entries);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Duplicate commodity"));
    }

    #[test]
    fn test_currency_constraint_violation() {
        let mut entries = vec![
            Open::new(date(2023, 1, 1), "Assets:Cash")
                .with_currencies(vec!["USD".into()])
                .into(),
            Open::new(date(2023, 1, 1), "Equity:Opening").into(),
        ];
        entries.push(txn(2023, 1, 2, "Assets:Cash", Amount::new(dec!(10), "EUR")));
        let errors = run(entries);
        assert!(errors
            .iter()
            .any(|e| e == "Invalid currency 'EUR' for account 'Assets:Cash'"));
    }

    #[test]
    fn test_unbalanced_transaction() {
        let mut entries = opens(&["Assets:Cash", "Equity:Opening"]);
        entries.push(
            Transaction::new(date(2023, 1, 2), "off by one")
                .with_posting(Posting::new("Assets:Cash", usd(dec!(10.00))))
                .with_posting(Posting::new("Equity:Opening", usd(dec!(-9.00))))
                .into(),
        );
        let errors = run(entries);
        assert!(errors.iter().any(|e| e.contains("does not balance")));
    }

    #[test]
    fn test_balance_assertion_passes_and_fails() {
        let mut entries = opens(&["Assets:Cash", "Equity:Opening"]);
        entries.push(txn(2023, 1, 2, "Assets:Cash", usd(dec!(100.00))));
        entries.push(
            BalanceAssertion::new(date(2023, 1, 3), "Assets:Cash", usd(dec!(100.00))).into(),
        );
        entries.push(
            BalanceAssertion::new(date(2023, 1, 4), "Assets:Cash", usd(dec!(120.00))).into(),
        );
        let mut sorted = entries;
        sort_entries(&mut sorted);
        let errors = validate(&mut sorted, &Options::default());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("20.00 too little"));
        assert_eq!(errors[0].category, ErrorCategory::Balance);

        // The failing assertion carries its observed difference.
        let failed = sorted
            .iter()
            .filter_map(Directive::as_balance)
            .find(|b| b.amount.number == dec!(120.00))
            .unwrap();
        assert_eq!(failed.diff, Some(usd(dec!(-20.00))));
    }

    #[test]
    fn test_balance_assertion_rolls_up_subaccounts() {
        let mut entries = opens(&[
            "Assets:Bank:Checking",
            "Assets:Bank:Savings",
            "Equity:Opening",
        ]);
        entries.push(txn(2023, 1, 2, "Assets:Bank:Checking", usd(dec!(100.00))));
        entries.push(txn(2023, 1, 3, "Assets:Bank:Savings", usd(dec!(50.00))));
        entries.push(
            BalanceAssertion::new(date(2023, 1, 4), "Assets:Bank", usd(dec!(150.00))).into(),
        );
        // The parent account was never opened; restrict to the assertion
        // checks here.
        let mut sorted = entries;
        sort_entries(&mut sorted);
        let errors = check_balance_assertions(&mut sorted, &Options::default());
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_balance_assertion_exact_tolerance_boundary() {
        let mut entries = opens(&["Assets:Cash", "Equity:Opening"]);
        entries.push(txn(2023, 1, 2, "Assets:Cash", usd(dec!(100.001))));
        // Tolerance exactly |diff|: passes.
        entries.push(
            BalanceAssertion::new(date(2023, 1, 3), "Assets:Cash", usd(dec!(100.000)))
                .with_tolerance(dec!(0.001))
                .into(),
        );
        assert!(run(entries.clone()).is_empty());

        // One step tighter: fails.
        entries.pop();
        entries.push(
            BalanceAssertion::new(date(2023, 1, 3), "Assets:Cash", usd(dec!(100.000)))
                .with_tolerance(dec!(0.0009))
                .into(),
        );
        let errors = run(entries);
        assert_eq!(errors.len(), 1);
    }
}
