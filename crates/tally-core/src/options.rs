//! The option map: per-ledger configuration set via `option` lines.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::account::{Account, AccountTypes};
use crate::currency::Currency;
use crate::directive::Booking;

/// Configuration collected from a ledger's `option`, `plugin` and
/// `include` lines.
///
/// The loader aggregates these across included files: the top-level file's
/// settings dominate, while operating currencies and plugins union across
/// files preserving first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Display title; no semantic effect.
    pub title: Option<String>,
    /// The main file, set by the loader after parsing.
    pub filename: Option<String>,
    /// The five account type root names.
    pub account_types: AccountTypes,
    /// Default booking method for accounts without an explicit one.
    pub booking_method: Booking,
    /// Ordered list of operating currencies.
    pub operating_currency: Vec<Currency>,
    /// Transfer currency for synthetic conversion entries.
    pub conversion_currency: Option<Currency>,
    /// Scale factor applied to `10^-scale` per posting when inferring
    /// tolerances.
    pub inferred_tolerance_multiplier: Decimal,
    /// Per-currency tolerance defaults; the `*` key sets the fallback.
    pub inferred_tolerance_default: BTreeMap<String, Decimal>,
    /// Whether cost- and price-scaled tolerances are inferred too.
    pub infer_tolerance_from_cost: bool,
    /// Equity sub-account receiving prior-period earnings.
    pub account_previous_earnings: String,
    /// Equity sub-account receiving prior-period balances.
    pub account_previous_balances: String,
    /// Equity sub-account receiving prior-period conversions.
    pub account_previous_conversions: String,
    /// Equity sub-account receiving current-period earnings.
    pub account_current_earnings: String,
    /// Equity sub-account receiving current-period conversions.
    pub account_current_conversions: String,
    /// Sub-account name for unrealized gains.
    pub account_unrealized_gains: String,
    /// Plugins named in the input, with optional configuration.
    pub plugins: Vec<(String, Option<String>)>,
    /// Absolute paths of every file read, recorded by the loader.
    pub include_filenames: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            title: None,
            filename: None,
            account_types: AccountTypes::default(),
            booking_method: Booking::Strict,
            operating_currency: Vec::new(),
            conversion_currency: None,
            inferred_tolerance_multiplier: Decimal::new(5, 1),
            inferred_tolerance_default: BTreeMap::new(),
            infer_tolerance_from_cost: true,
            account_previous_earnings: "Earnings:Previous".to_string(),
            account_previous_balances: "Opening-Balances".to_string(),
            account_previous_conversions: "Conversions:Previous".to_string(),
            account_current_earnings: "Earnings:Current".to_string(),
            account_current_conversions: "Conversions:Current".to_string(),
            account_unrealized_gains: "Earnings:Unrealized".to_string(),
            plugins: Vec::new(),
            include_filenames: Vec::new(),
        }
    }
}

impl Options {
    /// Fresh options with all defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an `option "KEY" "VALUE"` line.
    ///
    /// Unknown keys and malformed values are rejected with a message; the
    /// caller reports them without aborting the load.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "title" => self.title = Some(value.to_string()),
            "name_assets" => self.account_types.assets = Account::from(value),
            "name_liabilities" => self.account_types.liabilities = Account::from(value),
            "name_equity" => self.account_types.equity = Account::from(value),
            "name_income" => self.account_types.income = Account::from(value),
            "name_expenses" => self.account_types.expenses = Account::from(value),
            "booking_method" => {
                self.booking_method = Booking::from_str(value)
                    .map_err(|_| format!("invalid value \"{value}\" for option \"{key}\""))?;
            }
            "operating_currency" => self.add_operating_currency(Currency::from(value)),
            "conversion_currency" => self.conversion_currency = Some(Currency::from(value)),
            "inferred_tolerance_multiplier" => {
                self.inferred_tolerance_multiplier = Decimal::from_str_exact(value)
                    .map_err(|_| format!("invalid value \"{value}\" for option \"{key}\""))?;
            }
            "inferred_tolerance_default" => {
                let (currency, tolerance) = value
                    .split_once(':')
                    .ok_or_else(|| format!("invalid value \"{value}\" for option \"{key}\""))?;
                let tolerance = Decimal::from_str_exact(tolerance)
                    .map_err(|_| format!("invalid value \"{value}\" for option \"{key}\""))?;
                self.inferred_tolerance_default
                    .insert(currency.to_string(), tolerance);
            }
            "infer_tolerance_from_cost" => {
                self.infer_tolerance_from_cost = parse_bool(value)
                    .ok_or_else(|| format!("invalid value \"{value}\" for option \"{key}\""))?;
            }
            "account_previous_earnings" => self.account_previous_earnings = value.to_string(),
            "account_previous_balances" => self.account_previous_balances = value.to_string(),
            "account_previous_conversions" => {
                self.account_previous_conversions = value.to_string();
            }
            "account_current_earnings" => self.account_current_earnings = value.to_string(),
            "account_current_conversions" => {
                self.account_current_conversions = value.to_string();
            }
            "account_unrealized_gains" => self.account_unrealized_gains = value.to_string(),
            "filename" | "plugin" | "include" => {
                return Err(format!("option \"{key}\" may not be set directly"));
            }
            _ => return Err(format!("unknown option \"{key}\"")),
        }
        Ok(())
    }

    /// Append an operating currency, keeping the first occurrence of
    /// duplicates.
    pub fn add_operating_currency(&mut self, currency: Currency) {
        if !self.operating_currency.contains(&currency) {
            self.operating_currency.push(currency);
        }
    }

    /// Append a plugin, keeping the first occurrence of duplicates.
    pub fn add_plugin(&mut self, name: String, config: Option<String>) {
        if !self.plugins.iter().any(|(n, _)| *n == name) {
            self.plugins.push((name, config));
        }
    }

    /// The configured default tolerance for a currency: its own entry if
    /// present, else the `*` entry, else zero.
    #[must_use]
    pub fn default_tolerance(&self, currency: &Currency) -> Decimal {
        self.inferred_tolerance_default
            .get(currency.as_str())
            .or_else(|| self.inferred_tolerance_default.get("*"))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.booking_method, Booking::Strict);
        assert_eq!(options.account_types.assets, "Assets");
        assert_eq!(options.inferred_tolerance_multiplier, dec!(0.5));
        assert!(options.infer_tolerance_from_cost);
    }

    #[test]
    fn test_set_known_options() {
        let mut options = Options::default();
        options.set("title", "My Ledger").unwrap();
        options.set("booking_method", "FIFO").unwrap();
        options.set("operating_currency", "USD").unwrap();
        options.set("operating_currency", "EUR").unwrap();
        options.set("operating_currency", "USD").unwrap();
        options.set("name_assets", "Activa").unwrap();

        assert_eq!(options.title.as_deref(), Some("My Ledger"));
        assert_eq!(options.booking_method, Booking::Fifo);
        let expected: Vec<Currency> = vec!["USD".into(), "EUR".into()];
        assert_eq!(options.operating_currency, expected);
        assert_eq!(options.account_types.assets, "Activa");
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut options = Options::default();
        assert!(options.set("booking_method", "RANDOM").is_err());
        assert!(options.set("inferred_tolerance_multiplier", "lots").is_err());
        assert!(options.set("infer_tolerance_from_cost", "maybe").is_err());
        assert!(options.set("no_such_option", "x").is_err());
        assert!(options.set("filename", "x").is_err());
    }

    #[test]
    fn test_tolerance_defaults() {
        let mut options = Options::default();
        options.set("inferred_tolerance_default", "USD:0.003").unwrap();
        options.set("inferred_tolerance_default", "*:0.5").unwrap();

        assert_eq!(options.default_tolerance(&"USD".into()), dec!(0.003));
        assert_eq!(options.default_tolerance(&"EUR".into()), dec!(0.5));

        assert!(options.set("inferred_tolerance_default", "USD").is_err());
    }

    #[test]
    fn test_plugin_union() {
        let mut options = Options::default();
        options.add_plugin("auto_accounts".into(), None);
        options.add_plugin("auto_accounts".into(), Some("cfg".into()));
        assert_eq!(options.plugins.len(), 1);
        assert_eq!(options.plugins[0].1, None);
    }
}
