//! Core types for tally.
//!
//! This crate provides the data model shared by the whole pipeline:
//!
//! - [`Amount`] / [`IncompleteAmount`] - currency-tagged quantities, with
//!   and without missing fields
//! - [`Account`] and its name algebra, [`Currency`]
//! - [`Cost`], [`CostSpec`], [`CostBasis`] - lot costs, bound and unbound
//! - [`Position`] and [`Inventory`] - per-account holdings with booking
//!   outcomes
//! - [`Directive`] - the tagged variant over all twelve entry kinds
//! - [`PriceMap`] - dated price series per currency pair
//! - [`Options`] - the per-ledger option map
//! - [`LedgerError`] - structured, accumulated user-visible errors
//!
//! # Example
//!
//! ```
//! use tally_core::{Amount, ChangeKind, Inventory};
//! use rust_decimal_macros::dec;
//!
//! let mut inventory = Inventory::new();
//! let (_, kind) = inventory.add_amount(Amount::new(dec!(10), "USD"), None);
//! assert_eq!(kind, ChangeKind::Created);
//! let (_, kind) = inventory.add_amount(Amount::new(dec!(-4), "USD"), None);
//! assert_eq!(kind, ChangeKind::Reduced);
//! assert_eq!(inventory.units(&"USD".into()), dec!(6));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod account;
pub mod amount;
pub mod cost;
pub mod currency;
pub mod directive;
pub mod errors;
pub mod intern;
pub mod inventory;
pub mod options;
pub mod position;
pub mod prices;

pub use account::{common_prefix, Account, AccountKind, AccountTransformer, AccountTypes};
pub use amount::{Amount, IncompleteAmount};
pub use cost::{Cost, CostBasis, CostSpec};
pub use currency::Currency;
pub use directive::{
    sort_entries, BalanceAssertion, Booking, Close, Commodity, Custom, Directive, Document, Event,
    Meta, MetaValue, Note, Open, Pad, Posting, Price, PriceAnnotation, Query, Transaction,
};
pub use errors::{ErrorCategory, LedgerError, SourceLocation};
pub use intern::Symbol;
pub use inventory::{ChangeKind, Inventory, LotRef, PositionRef};
pub use options::Options;
pub use position::Position;
pub use prices::{PriceMap, PricePair, PricePoint};

// Re-export commonly used external types.
pub use chrono::NaiveDate;
pub use rust_decimal::Decimal;
