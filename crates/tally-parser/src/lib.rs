//! Parser for the tally ledger text format.
//!
//! Consumes source text and produces the directive stream together with
//! the file's `option`, `include` and `plugin` lines and any syntax
//! errors. The parser recovers from bad lines: it reports them and keeps
//! going, so a single typo does not hide the rest of the file.
//!
//! # Example
//!
//! ```
//! let source = "\
//! 2024-01-15 * \"Coffee Shop\" \"Morning coffee\"
//!   Expenses:Food:Coffee  5.00 USD
//!   Assets:Cash
//! ";
//!
//! let result = tally_parser::parse(source, None);
//! assert!(result.errors.is_empty());
//! assert_eq!(result.directives.len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod grammar;

use serde::{Deserialize, Serialize};
use tally_core::Directive;

/// A syntax error with its 1-based line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    /// Human-readable description.
    pub message: String,
    /// The 1-based line the error points at.
    pub lineno: u32,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.lineno, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Everything extracted from one source file.
#[derive(Debug, Default)]
pub struct ParseResult {
    /// The parsed directives, in file order.
    pub directives: Vec<Directive>,
    /// `option "KEY" "VALUE"` lines, in file order.
    pub options: Vec<(String, String)>,
    /// `include "PATH"` lines, in file order.
    pub includes: Vec<String>,
    /// `plugin "NAME" ["CONFIG"]` lines, in file order.
    pub plugins: Vec<(String, Option<String>)>,
    /// Syntax errors; parsing continued past them.
    pub errors: Vec<ParseError>,
}

/// Parse ledger source text.
///
/// `filename` is stamped into every directive's metadata when given, so
/// downstream errors can point at the right file.
#[must_use]
pub fn parse(source: &str, filename: Option<&str>) -> ParseResult {
    grammar::parse(source, filename)
}

/// Maps byte offsets to 1-based line numbers.
pub(crate) struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub(crate) fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.char_indices().filter(|(_, c)| *c == '\n').map(|(i, _)| i + 1));
        Self { line_starts }
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn line_of(&self, offset: usize) -> u32 {
        self.line_starts.partition_point(|start| *start <= offset) as u32
    }
}
