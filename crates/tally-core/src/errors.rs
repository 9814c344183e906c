//! User-surfaceable errors.
//!
//! Every user-visible failure in the pipeline (parse trouble, an
//! unbookable reduction, a failed balance assertion) is *data*: a
//! [`LedgerError`] with a category, a source location, a message and
//! optionally the offending entry. Stages accumulate these and keep going;
//! only host-level conditions short-circuit.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::directive::Directive;
use crate::intern::Symbol;

/// Which pipeline stage produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Syntax trouble in the input text.
    Parser,
    /// File resolution or reading trouble.
    Load,
    /// A posting could not be placed into a currency bucket.
    Categorization,
    /// General booking failure.
    Booking,
    /// A reduction could not be matched against lots.
    Reduction,
    /// Missing numbers could not be solved.
    Interpolation,
    /// A balance assertion failed.
    Balance,
    /// Pad processing failure.
    Pad,
    /// An accounting invariant was violated.
    Validation,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parser => "parser",
            Self::Load => "load",
            Self::Categorization => "categorization",
            Self::Booking => "booking",
            Self::Reduction => "reduction",
            Self::Interpolation => "interpolation",
            Self::Balance => "balance",
            Self::Pad => "pad",
            Self::Validation => "validation",
        })
    }
}

/// Where in the input an error points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// The file, when attributable.
    pub filename: Option<Symbol>,
    /// The 1-based line, when attributable (0 otherwise).
    pub lineno: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filename {
            Some(filename) => write!(f, "{filename}:{}", self.lineno),
            None => write!(f, "<input>:{}", self.lineno),
        }
    }
}

/// A user-visible error from any stage of the load pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerError {
    /// The producing stage.
    pub category: ErrorCategory,
    /// Where the error points in the input.
    pub source: SourceLocation,
    /// Human-readable description.
    pub message: String,
    /// The offending entry, when one exists.
    pub entry: Option<Box<Directive>>,
}

impl LedgerError {
    /// An error without an attributable location.
    #[must_use]
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            source: SourceLocation::default(),
            message: message.into(),
            entry: None,
        }
    }

    /// Point the error at a file and line.
    #[must_use]
    pub fn at(mut self, filename: Option<Symbol>, lineno: u32) -> Self {
        self.source = SourceLocation { filename, lineno };
        self
    }

    /// Attach the offending entry, taking its location too.
    #[must_use]
    pub fn with_entry(mut self, entry: &Directive) -> Self {
        let meta = entry.meta();
        self.source = SourceLocation {
            filename: meta.filename.clone(),
            lineno: meta.lineno,
        };
        self.entry = Some(Box::new(entry.clone()));
        self
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.source, self.category, self.message)
    }
}

impl std::error::Error for LedgerError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::Transaction;
    use chrono::NaiveDate;

    #[test]
    fn test_display() {
        let error = LedgerError::new(ErrorCategory::Validation, "boom").at(Some("main.tally".into()), 7);
        assert_eq!(error.to_string(), "main.tally:7: validation: boom");

        let bare = LedgerError::new(ErrorCategory::Parser, "bad token");
        assert_eq!(bare.to_string(), "<input>:0: parser: bad token");
    }

    #[test]
    fn test_with_entry_takes_location() {
        let mut txn = Transaction::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "x");
        txn.meta.filename = Some("a.tally".into());
        txn.meta.lineno = 12;
        let entry: Directive = txn.into();

        let error = LedgerError::new(ErrorCategory::Booking, "no lot").with_entry(&entry);
        assert_eq!(error.source.lineno, 12);
        assert!(error.entry.is_some());
    }
}
