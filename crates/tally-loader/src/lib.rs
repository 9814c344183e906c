//! The tally load orchestrator.
//!
//! Loading turns a filename (or a literal string) into a validated entry
//! stream: parse the source, resolve `include`s recursively, aggregate
//! the option maps, sort everything by date, run the booking engine, the
//! pad processor and the validator, and hand back
//! `(entries, errors, options)` in one [`LoadResult`]. Every stage keeps
//! going past errors so one load surfaces as many problems as possible;
//! only unreadable files short-circuit, and then only for that file.
//!
//! # Example
//!
//! ```
//! let result = tally_loader::load_string(
//!     "2024-01-01 open Assets:Cash\n\
//!      2024-01-01 open Expenses:Food\n\
//!      2024-01-02 * \"lunch\"\n  Expenses:Food  10.00 USD\n  Assets:Cash\n",
//! );
//! assert!(result.errors.is_empty());
//! assert_eq!(result.entries.len(), 3);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use tally_core::{sort_entries, Directive, ErrorCategory, LedgerError, Options, PriceMap, Symbol};

/// Everything a load produces.
#[derive(Debug)]
pub struct LoadResult {
    /// The booked, padded, validated entry stream, sorted by
    /// (date, rank, line).
    pub entries: Vec<Directive>,
    /// Every error from every stage, in pipeline order.
    pub errors: Vec<LedgerError>,
    /// The aggregated option map.
    pub options: Options,
    /// Dated prices indexed from the final entry stream; read-only.
    pub price_map: PriceMap,
    /// SHA-256 over the loaded files and their content digests.
    pub input_hash: String,
}

impl LoadResult {
    /// Whether the load produced no errors.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Walks the include graph and accumulates raw parse output.
#[derive(Default)]
struct Loader {
    /// Canonical paths already loaded, to prevent double-loading.
    visited: HashSet<PathBuf>,
    /// Absolute filenames in visit order.
    filenames: Vec<PathBuf>,
    /// Content digest per visited file, for the input hash.
    digests: Vec<(PathBuf, [u8; 32])>,
    entries: Vec<Directive>,
    errors: Vec<LedgerError>,
    options: Options,
}

impl Loader {
    /// Read and parse one file, then recurse into its includes.
    ///
    /// `top_level` decides whether the file's options dominate or only
    /// contribute operating currencies and plugins.
    fn load_file(&mut self, path: &Path, top_level: bool) {
        let display = path.display().to_string();
        let canonical = match path.canonicalize() {
            Ok(canonical) => canonical,
            Err(error) => {
                self.errors.push(
                    LedgerError::new(
                        ErrorCategory::Load,
                        format!("cannot resolve {display}: {error}"),
                    )
                    .at(Some(Symbol::from(display)), 0),
                );
                return;
            }
        };
        if !self.visited.insert(canonical.clone()) {
            return;
        }

        let source = match fs::read_to_string(&canonical) {
            Ok(source) => source,
            Err(error) => {
                self.errors.push(
                    LedgerError::new(
                        ErrorCategory::Load,
                        format!("cannot read {display}: {error}"),
                    )
                    .at(Some(Symbol::from(display)), 0),
                );
                return;
            }
        };
        self.digests.push((canonical.clone(), Sha256::digest(&source).into()));
        self.filenames.push(canonical.clone());
        debug!(file = %canonical.display(), bytes = source.len(), "loading");

        let filename = canonical.display().to_string();
        let parsed = tally_parser::parse(&source, Some(&filename));
        self.absorb(parsed, Some(&canonical), top_level);
    }

    /// Fold one file's parse output into the accumulated state.
    fn absorb(&mut self, parsed: tally_parser::ParseResult, from: Option<&Path>, top_level: bool) {
        let filename: Option<Symbol> = from.map(|p| Symbol::from(p.display().to_string()));

        for error in parsed.errors {
            self.errors.push(
                LedgerError::new(ErrorCategory::Parser, error.message)
                    .at(filename.clone(), error.lineno),
            );
        }

        for (key, value) in parsed.options {
            if top_level {
                if let Err(message) = self.options.set(&key, &value) {
                    self.errors.push(
                        LedgerError::new(ErrorCategory::Validation, message)
                            .at(filename.clone(), 0),
                    );
                }
            } else if key == "operating_currency" {
                // Included files only contribute to the union-style
                // options; the top-level file dominates everything else.
                self.options.add_operating_currency(value.as_str().into());
            }
        }

        for (name, config) in parsed.plugins {
            self.options.add_plugin(name, config);
        }

        self.entries.extend(parsed.directives);

        let base = from.and_then(Path::parent).map(Path::to_path_buf);
        for include in parsed.includes {
            let target = match &base {
                Some(base) => base.join(&include),
                None => PathBuf::from(&include),
            };
            self.load_file(&target, false);
        }
    }

    /// Run the remaining pipeline on the accumulated raw entries.
    fn finish(mut self) -> LoadResult {
        sort_entries(&mut self.entries);

        let booked = tally_booking::book(self.entries, &self.options);
        let mut entries = booked.entries;
        self.errors.extend(booked.errors);

        self.errors
            .extend(tally_booking::process_pads(&mut entries, &self.options));
        self.errors
            .extend(tally_validate::validate(&mut entries, &self.options));
        let price_map = PriceMap::build(&entries);

        self.options.include_filenames = self
            .filenames
            .iter()
            .map(|p| p.display().to_string())
            .collect();

        let input_hash = compute_input_hash(self.digests);
        debug!(
            entries = entries.len(),
            errors = self.errors.len(),
            "load finished"
        );

        LoadResult {
            entries,
            errors: self.errors,
            options: self.options,
            price_map,
            input_hash,
        }
    }
}

/// SHA-256 over the sorted list of loaded filenames and their content
/// digests. Identical inputs hash identically regardless of include
/// order.
fn compute_input_hash(mut digests: Vec<(PathBuf, [u8; 32])>) -> String {
    digests.sort();
    let mut hasher = Sha256::new();
    for (path, digest) in &digests {
        hasher.update(path.display().to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(digest);
    }
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Load a ledger from a file, resolving includes relative to it.
#[must_use]
pub fn load(path: &Path) -> LoadResult {
    let mut loader = Loader::default();
    loader.load_file(path, true);
    loader.options.filename = Some(path.display().to_string());
    loader.finish()
}

/// Load a ledger from a literal string.
///
/// Includes are resolved relative to the current directory.
#[must_use]
pub fn load_string(source: &str) -> LoadResult {
    let mut loader = Loader::default();
    let parsed = tally_parser::parse(source, None);
    loader.absorb(parsed, None, true);
    loader.finish()
}
