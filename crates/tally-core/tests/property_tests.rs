//! Property-based tests for tally-core.
//!
//! These check the structural invariants of the data model for arbitrary
//! inputs using proptest.

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_core::{common_prefix, Account, Amount, Cost, Inventory, PriceMap};

// ============================================================================
// Arbitrary generators
// ============================================================================

fn arb_decimal() -> impl Strategy<Value = Decimal> {
    (-1_000_000i64..1_000_000i64).prop_map(|n| Decimal::new(n, 2))
}

fn arb_nonzero_decimal() -> impl Strategy<Value = Decimal> {
    arb_decimal().prop_filter("nonzero", |d| !d.is_zero())
}

fn arb_currency() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("USD".to_string()),
        Just("EUR".to_string()),
        Just("GBP".to_string()),
        Just("HOOL".to_string()),
    ]
}

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (2020i32..2025i32, 1u32..13u32, 1u32..29u32)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

fn arb_cost() -> impl Strategy<Value = Cost> {
    (1i64..100_000i64, arb_currency(), arb_date())
        .prop_map(|(n, c, d)| Cost::new(Decimal::new(n, 2), c, d))
}

fn arb_entry() -> impl Strategy<Value = (Amount, Option<Cost>)> {
    (
        arb_nonzero_decimal(),
        arb_currency(),
        prop::option::of(arb_cost()),
    )
        .prop_map(|(n, c, cost)| (Amount::new(n, c), cost))
}

fn arb_inventory() -> impl Strategy<Value = Inventory> {
    prop::collection::vec(arb_entry(), 0..12).prop_map(|entries| {
        let mut inventory = Inventory::new();
        for (units, cost) in entries {
            inventory.add_amount(units, cost);
        }
        inventory
    })
}

fn arb_account() -> impl Strategy<Value = Account> {
    let component = prop_oneof![
        Just("Bank"),
        Just("Checking"),
        Just("Savings"),
        Just("Broker"),
        Just("Cash"),
    ];
    (
        prop_oneof![Just("Assets"), Just("Expenses"), Just("Income")],
        prop::collection::vec(component, 1..4),
    )
        .prop_map(|(root, rest)| {
            let mut components = vec![root];
            components.extend(rest);
            Account::join(&components)
        })
}

// ============================================================================
// Inventory properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// No sequence of additions leaves a zero-unit position behind.
    #[test]
    fn prop_inventory_invariants_hold(inventory in arb_inventory()) {
        prop_assert!(inventory.check_invariants().is_ok());
    }

    /// Adding an amount and its negation restores the prior state.
    #[test]
    fn prop_add_then_negate_is_identity(
        inventory in arb_inventory(),
        entry in arb_entry(),
    ) {
        let (units, cost) = entry;
        let before = inventory.clone();
        let mut after = inventory;
        after.add_amount(units.clone(), cost.clone());
        after.add_amount(-&units, cost);
        prop_assert_eq!(before, after);
    }

    /// add_inventory agrees with per-currency unit sums.
    #[test]
    fn prop_add_inventory_sums_units(a in arb_inventory(), b in arb_inventory()) {
        let mut merged = a.clone();
        merged.add_inventory(&b);
        for currency in ["USD", "EUR", "GBP", "HOOL"] {
            let currency = currency.into();
            prop_assert_eq!(
                merged.units(&currency),
                a.units(&currency) + b.units(&currency)
            );
        }
    }

    /// Splitting by currency loses nothing.
    #[test]
    fn prop_split_partitions_positions(inventory in arb_inventory()) {
        let split = inventory.split();
        let total: usize = split.values().map(Inventory::len).sum();
        prop_assert_eq!(total, inventory.len());
        for (currency, part) in split {
            prop_assert_eq!(part.currencies(), vec![&currency]);
        }
    }
}

// ============================================================================
// Account name properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// join is the inverse of split.
    #[test]
    fn prop_join_split_roundtrip(account in arb_account()) {
        let components: Vec<&str> = account.split().collect();
        prop_assert_eq!(Account::join(&components), account);
    }

    /// parents() walks from the account itself up to its type component.
    #[test]
    fn prop_parents_ends_at_root(account in arb_account()) {
        let chain: Vec<Account> = account.parents().collect();
        prop_assert_eq!(chain.first(), Some(&account));
        let last = chain.last().unwrap();
        prop_assert!(last.parent().is_none());
        prop_assert_eq!(chain.len(), account.split().count());
    }

    /// The common prefix of an account with itself is the account.
    #[test]
    fn prop_common_prefix_idempotent(account in arb_account()) {
        prop_assert_eq!(common_prefix([&account, &account]), Some(account));
    }
}

// ============================================================================
// Price map properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Whenever a rate is defined, the inverse pair holds its reciprocal.
    #[test]
    fn prop_price_reciprocal(
        rates in prop::collection::vec((arb_date(), 1i64..1_000_000i64), 1..8)
    ) {
        let entries: Vec<tally_core::Directive> = rates
            .iter()
            .map(|(date, n)| {
                tally_core::Price::new(
                    *date,
                    "EUR",
                    Amount::new(Decimal::new(*n, 4), "USD"),
                )
                .into()
            })
            .collect();
        let map = PriceMap::build(&entries);

        let eur = "EUR".into();
        let usd = "USD".into();
        let forward = map.get_latest_price(&eur, &usd).unwrap();
        let inverse = map.get_latest_price(&usd, &eur).unwrap();
        prop_assert_eq!(inverse.rate, Decimal::ONE / forward.rate);
        prop_assert_eq!(forward.date, inverse.date);
    }
}
