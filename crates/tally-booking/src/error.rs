//! Booking failure kinds and their conversion to ledger errors.

use rust_decimal::Decimal;
use tally_core::{Account, Currency, ErrorCategory, LedgerError, Meta, Posting};
use thiserror::Error;

/// Everything that can go wrong while booking one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingErrorKind {
    /// A posting's units currency could not be resolved.
    #[error("Failed to categorize posting: units currency is unknown")]
    UnresolvedUnitsCurrency,
    /// A posting's cost currency could not be resolved.
    #[error("Failed to categorize posting: cost currency is unknown")]
    UnresolvedCostCurrency,
    /// A posting's price currency could not be resolved.
    #[error("Failed to categorize posting: price currency is unknown")]
    UnresolvedPriceCurrency,
    /// More than one value is missing within a currency group.
    #[error("Too many missing numbers")]
    TooManyMissingNumbers,
    /// A reduction found no lot to match against.
    #[error("No position matches the reduction against inventory")]
    NoMatchingLots,
    /// A STRICT reduction matched more than one lot.
    #[error("Ambiguous matches for reduction: {0} lots match")]
    AmbiguousMatches(usize),
    /// The matched lots hold fewer units than the reduction needs.
    #[error("Not enough lots to reduce: missing {0} units")]
    InsufficientLots(Decimal),
    /// Interpolation solved a negative per-unit cost.
    #[error("Cost per unit is negative after interpolation: {0}")]
    NegativeCost(Decimal),
    /// At-cost postings on one account both augment and reduce.
    #[error("Postings on account '{account}' both augment and reduce {currency} at cost")]
    SelfReduction {
        /// The account.
        account: Account,
        /// The units currency.
        currency: Currency,
    },
    /// A number or cost survived to the end of booking unresolved.
    #[error("Transaction still has missing values after booking")]
    IncompleteAfterBooking,
}

impl BookingErrorKind {
    /// Which error category this failure surfaces under.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::UnresolvedUnitsCurrency
            | Self::UnresolvedCostCurrency
            | Self::UnresolvedPriceCurrency => ErrorCategory::Categorization,
            Self::TooManyMissingNumbers | Self::NegativeCost(_) => ErrorCategory::Interpolation,
            Self::NoMatchingLots | Self::AmbiguousMatches(_) | Self::InsufficientLots(_) => {
                ErrorCategory::Reduction
            }
            Self::SelfReduction { .. } | Self::IncompleteAfterBooking => ErrorCategory::Booking,
        }
    }

    /// Surface this failure at a posting's location.
    #[must_use]
    pub fn at_posting(self, posting: &Posting) -> LedgerError {
        self.at_meta(&posting.meta)
    }

    /// Surface this failure at an arbitrary location.
    #[must_use]
    pub fn at_meta(self, meta: &Meta) -> LedgerError {
        LedgerError::new(self.category(), self.to_string())
            .at(meta.filename.clone(), meta.lineno)
    }
}
