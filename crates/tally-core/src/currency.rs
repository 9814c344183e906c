//! Currency codes.

use crate::intern::symbol_newtype;

symbol_newtype! {
    /// A currency or commodity code (e.g. "USD", "EUR", "HOOL").
    ///
    /// A newtype wrapper so currency codes cannot be mixed up with other
    /// strings such as account names. Clones are cheap.
    Currency
}

impl Currency {
    /// Whether this code is lexically valid.
    ///
    /// A valid code starts with an uppercase letter, continues with
    /// uppercase letters, digits, `'`, `.`, `_` or `-`, and does not end in
    /// punctuation. A `/`-separated secondary leg of the same shape is
    /// allowed (e.g. for currency pairs).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let mut legs = self.as_str().split('/');
        let first = legs.next().is_some_and(is_valid_leg);
        first && legs.all(is_valid_leg)
    }
}

fn is_valid_leg(leg: &str) -> bool {
    let mut chars = leg.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_uppercase() {
        return false;
    }
    let valid_middle =
        |c: char| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '\'' | '.' | '_' | '-');
    if !chars.all(valid_middle) {
        return false;
    }
    // Codes longer than one character must not end in punctuation.
    leg.len() == 1
        || leg
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(s: &str) -> bool {
        Currency::from(s).is_valid()
    }

    #[test]
    fn test_plain_codes() {
        assert!(valid("USD"));
        assert!(valid("EUR"));
        assert!(valid("HOOL"));
        assert!(valid("V"));
        assert!(valid("AAPL34"));
        assert!(valid("VACHR-2024"));
        assert!(valid("BRK.B"));
    }

    #[test]
    fn test_invalid_codes() {
        assert!(!valid(""));
        assert!(!valid("usd"));
        assert!(!valid("1USD"));
        assert!(!valid("US-"));
        assert!(!valid("USD."));
        assert!(!valid("US D"));
    }

    #[test]
    fn test_pair_codes() {
        assert!(valid("USD/CAD"));
        assert!(!valid("USD/"));
        assert!(!valid("/CAD"));
    }
}
