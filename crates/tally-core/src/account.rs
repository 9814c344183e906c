//! Account names and the account-name algebra.
//!
//! An account name is a colon-separated hierarchical name whose first
//! component is one of the five account types (e.g.
//! `Assets:Bank:Checking`). This module provides the pure name operations
//! (parent, leaf, join, common prefix, ...) plus the classification of
//! accounts into balance-sheet and income-statement kinds.

use serde::{Deserialize, Serialize};

use crate::intern::symbol_newtype;

/// Separator between the components of an account name.
pub const SEPARATOR: char = ':';

symbol_newtype! {
    /// A hierarchical account name such as `Assets:Bank:Checking`.
    ///
    /// Clones are cheap; the name is immutable. Validity is not enforced on
    /// construction (the parser accepts what it lexes and the validator
    /// reports offenders); use [`Account::is_valid`] to check.
    Account
}

impl Account {
    /// Join name components into an account name.
    #[must_use]
    pub fn join<S: AsRef<str>>(components: &[S]) -> Self {
        let mut name = String::new();
        for (i, c) in components.iter().enumerate() {
            if i > 0 {
                name.push(SEPARATOR);
            }
            name.push_str(c.as_ref());
        }
        name.into()
    }

    /// The name components, in order.
    pub fn split(&self) -> impl Iterator<Item = &str> {
        self.as_str().split(SEPARATOR)
    }

    /// The parent account, or `None` for a root account.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.as_str()
            .rfind(SEPARATOR)
            .map(|index| Self::from(&self.as_str()[..index]))
    }

    /// The last name component.
    #[must_use]
    pub fn leaf(&self) -> &str {
        self.as_str()
            .rfind(SEPARATOR)
            .map_or(self.as_str(), |index| &self.as_str()[index + 1..])
    }

    /// The name without its leading type component.
    ///
    /// Returns an empty string for a bare type name.
    #[must_use]
    pub fn sans_root(&self) -> &str {
        self.as_str()
            .find(SEPARATOR)
            .map_or("", |index| &self.as_str()[index + 1..])
    }

    /// The first `n` components as an account name.
    ///
    /// `root(1)` is the type component; asking for more components than the
    /// name has returns the whole name.
    #[must_use]
    pub fn root(&self, n: usize) -> Self {
        let mut end = self.as_str().len();
        for (i, (index, _)) in self.as_str().match_indices(SEPARATOR).enumerate() {
            if i + 1 == n {
                end = index;
                break;
            }
        }
        Self::from(&self.as_str()[..end])
    }

    /// Whether `component` appears as one of the name components.
    #[must_use]
    pub fn has_component(&self, component: &str) -> bool {
        self.split().any(|c| c == component)
    }

    /// This account and all its ancestors, up to the root.
    ///
    /// The sequence starts with the account itself and ends with the type
    /// component; it is a plain iterator and can be restarted by calling
    /// this again.
    #[must_use]
    pub fn parents(&self) -> Parents {
        Parents {
            next: Some(self.clone()),
        }
    }

    /// Whether this name is lexically valid.
    ///
    /// The type component matches `[A-Z][a-zA-Z0-9-]*` and is followed by
    /// one or more components matching `[A-Z0-9][a-zA-Z0-9-]*`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let mut components = self.as_str().split(SEPARATOR);
        let Some(first) = components.next() else {
            return false;
        };
        if !is_valid_component(first, false) {
            return false;
        }
        let mut rest = 0;
        for component in components {
            if !is_valid_component(component, true) {
                return false;
            }
            rest += 1;
        }
        rest > 0
    }
}

fn is_valid_component(component: &str, digit_start: bool) -> bool {
    let mut chars = component.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let start_ok = first.is_ascii_uppercase() || (digit_start && first.is_ascii_digit());
    start_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// The longest common account prefix of a set of names, by whole components.
#[must_use]
pub fn common_prefix<'a, I: IntoIterator<Item = &'a Account>>(accounts: I) -> Option<Account> {
    let mut iter = accounts.into_iter();
    let mut prefix: Vec<&str> = iter.next()?.split().collect();
    for account in iter {
        let shared = prefix
            .iter()
            .zip(account.split())
            .take_while(|(a, b)| **a == *b)
            .count();
        prefix.truncate(shared);
        if prefix.is_empty() {
            return None;
        }
    }
    Some(Account::join(&prefix))
}

/// Iterator over an account and its ancestors. See [`Account::parents`].
#[derive(Debug, Clone)]
pub struct Parents {
    next: Option<Account>,
}

impl Iterator for Parents {
    type Item = Account;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.parent();
        Some(current)
    }
}

/// Rewrites the account separator to a different character and back.
///
/// Useful for surfaces where `:` is reserved (e.g. filenames). The rewrite
/// is bijective as long as the replacement character does not occur in any
/// component.
#[derive(Debug, Clone, Copy)]
pub struct AccountTransformer {
    separator: char,
}

impl AccountTransformer {
    /// Create a transformer using the given replacement separator.
    #[must_use]
    pub const fn new(separator: char) -> Self {
        Self { separator }
    }

    /// Render an account name with the replacement separator.
    #[must_use]
    pub fn render(&self, account: &Account) -> String {
        account.as_str().replace(SEPARATOR, &self.separator.to_string())
    }

    /// Parse a rendered name back into an account name.
    #[must_use]
    pub fn parse(&self, text: &str) -> Account {
        text.replace(self.separator, &SEPARATOR.to_string()).into()
    }
}

/// The five kinds of account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountKind {
    /// Things owned.
    Assets,
    /// Things owed.
    Liabilities,
    /// Net worth residual.
    Equity,
    /// Inflows over a period.
    Income,
    /// Outflows over a period.
    Expenses,
}

impl AccountKind {
    /// The sign convention of the kind: +1 where balances normally grow
    /// positive (assets, expenses), −1 otherwise.
    #[must_use]
    pub const fn sign(self) -> i8 {
        match self {
            Self::Assets | Self::Expenses => 1,
            Self::Liabilities | Self::Equity | Self::Income => -1,
        }
    }

    /// Whether accounts of this kind appear on the balance sheet.
    #[must_use]
    pub const fn is_balance_sheet(self) -> bool {
        matches!(self, Self::Assets | Self::Liabilities | Self::Equity)
    }

    /// Whether accounts of this kind appear on the income statement.
    #[must_use]
    pub const fn is_income_statement(self) -> bool {
        matches!(self, Self::Income | Self::Expenses)
    }
}

/// The configured names of the five account type roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTypes {
    /// Root name for asset accounts.
    pub assets: Account,
    /// Root name for liability accounts.
    pub liabilities: Account,
    /// Root name for equity accounts.
    pub equity: Account,
    /// Root name for income accounts.
    pub income: Account,
    /// Root name for expense accounts.
    pub expenses: Account,
}

impl Default for AccountTypes {
    fn default() -> Self {
        Self {
            assets: "Assets".into(),
            liabilities: "Liabilities".into(),
            equity: "Equity".into(),
            income: "Income".into(),
            expenses: "Expenses".into(),
        }
    }
}

impl AccountTypes {
    /// Classify an account by its type component.
    #[must_use]
    pub fn kind(&self, account: &Account) -> Option<AccountKind> {
        let root = account.root(1);
        if root == self.assets {
            Some(AccountKind::Assets)
        } else if root == self.liabilities {
            Some(AccountKind::Liabilities)
        } else if root == self.equity {
            Some(AccountKind::Equity)
        } else if root == self.income {
            Some(AccountKind::Income)
        } else if root == self.expenses {
            Some(AccountKind::Expenses)
        } else {
            None
        }
    }

    /// Whether the account starts with one of the configured roots.
    #[must_use]
    pub fn has_valid_root(&self, account: &Account) -> bool {
        self.kind(account).is_some()
    }
}
