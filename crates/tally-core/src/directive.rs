//! The directive model: every kind of ledger entry.
//!
//! A [`Directive`] is a tagged variant over the twelve entry kinds, each
//! carrying a date and a [`Meta`] with its source location and user
//! key/values. The parser creates directives, the loader sorts and
//! enriches them, booking rewrites transaction postings, and validation
//! may attach a difference to a failed [`BalanceAssertion`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::account::Account;
use crate::amount::{Amount, IncompleteAmount};
use crate::cost::CostBasis;
use crate::currency::Currency;
use crate::intern::Symbol;

/// Source location and user metadata attached to a directive or posting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// The file this entry came from, when known.
    pub filename: Option<Symbol>,
    /// The 1-based line the entry starts on (0 when synthesized).
    pub lineno: u32,
    /// User key/value metadata lines.
    pub kv: BTreeMap<String, MetaValue>,
}

impl Meta {
    /// Empty metadata for synthesized entries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata locating an entry in a source file.
    #[must_use]
    pub fn at(filename: Option<Symbol>, lineno: u32) -> Self {
        Self {
            filename,
            lineno,
            kv: BTreeMap::new(),
        }
    }
}

/// A value in the user metadata map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaValue {
    /// A quoted string.
    String(String),
    /// An account reference.
    Account(Account),
    /// A currency code.
    Currency(Currency),
    /// A `#tag`.
    Tag(String),
    /// A `^link`.
    Link(String),
    /// A date.
    Date(NaiveDate),
    /// A bare number.
    Number(Decimal),
    /// A boolean.
    Bool(bool),
    /// A number with a currency.
    Amount(Amount),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Account(a) => write!(f, "{a}"),
            Self::Currency(c) => write!(f, "{c}"),
            Self::Tag(t) => write!(f, "#{t}"),
            Self::Link(l) => write!(f, "^{l}"),
            Self::Date(d) => write!(f, "{d}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Self::Amount(a) => write!(f, "{a}"),
        }
    }
}

/// How lots are matched when a posting reduces an account's inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Booking {
    /// Require an unambiguous lot match.
    #[default]
    Strict,
    /// Like STRICT, but an exact-size match resolves ambiguity.
    StrictWithSize,
    /// Do not match lots at all; reductions simply augment.
    None,
    /// Collapse lots to their average cost before matching.
    Average,
    /// Consume the oldest lots first.
    Fifo,
    /// Consume the newest lots first.
    Lifo,
    /// Consume the highest-cost lots first.
    Hifo,
}

impl FromStr for Booking {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STRICT" => Ok(Self::Strict),
            "STRICT_WITH_SIZE" => Ok(Self::StrictWithSize),
            "NONE" => Ok(Self::None),
            "AVERAGE" => Ok(Self::Average),
            "FIFO" => Ok(Self::Fifo),
            "LIFO" => Ok(Self::Lifo),
            "HIFO" => Ok(Self::Hifo),
            _ => Err(format!("unknown booking method: {s}")),
        }
    }
}

impl fmt::Display for Booking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "STRICT",
            Self::StrictWithSize => "STRICT_WITH_SIZE",
            Self::None => "NONE",
            Self::Average => "AVERAGE",
            Self::Fifo => "FIFO",
            Self::Lifo => "LIFO",
            Self::Hifo => "HIFO",
        })
    }
}

/// A price annotation on a posting: `@` per unit or `@@` in total.
///
/// The amount may be incomplete until interpolation; booking normalizes
/// total prices to per-unit ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceAnnotation {
    /// `@ AMOUNT`: price per unit.
    Unit(IncompleteAmount),
    /// `@@ AMOUNT`: price for the whole posting.
    Total(IncompleteAmount),
}

impl PriceAnnotation {
    /// The annotation's amount, complete or not.
    #[must_use]
    pub const fn amount(&self) -> &IncompleteAmount {
        match self {
            Self::Unit(a) | Self::Total(a) => a,
        }
    }

    /// Mutable access to the annotation's amount.
    pub fn amount_mut(&mut self) -> &mut IncompleteAmount {
        match self {
            Self::Unit(a) | Self::Total(a) => a,
        }
    }

    /// The annotation's currency, if present.
    #[must_use]
    pub fn currency(&self) -> Option<&Currency> {
        self.amount().currency.as_ref()
    }
}

impl fmt::Display for PriceAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit(a) => write!(f, "@ {a}"),
            Self::Total(a) => write!(f, "@@ {a}"),
        }
    }
}

/// One leg of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// The account this leg applies to.
    pub account: Account,
    /// The units; fields missing until interpolation.
    pub units: IncompleteAmount,
    /// The attached cost, unbound until booking. `None` means no cost.
    pub cost: Option<CostBasis>,
    /// The price annotation, if any.
    pub price: Option<PriceAnnotation>,
    /// A per-posting flag.
    pub flag: Option<char>,
    /// Source location and user metadata.
    pub meta: Meta,
}

impl Posting {
    /// A posting with complete units.
    #[must_use]
    pub fn new(account: impl Into<Account>, units: Amount) -> Self {
        Self {
            account: account.into(),
            units: units.into(),
            cost: None,
            price: None,
            flag: None,
            meta: Meta::new(),
        }
    }

    /// A posting with no amount at all, to be filled by interpolation.
    #[must_use]
    pub fn auto(account: impl Into<Account>) -> Self {
        Self {
            account: account.into(),
            units: IncompleteAmount::empty(),
            cost: None,
            price: None,
            flag: None,
            meta: Meta::new(),
        }
    }

    /// A posting with partial units.
    #[must_use]
    pub fn incomplete(account: impl Into<Account>, units: IncompleteAmount) -> Self {
        Self {
            account: account.into(),
            units,
            cost: None,
            price: None,
            flag: None,
            meta: Meta::new(),
        }
    }

    /// Attach a cost basis.
    #[must_use]
    pub fn with_cost(mut self, cost: impl Into<CostBasis>) -> Self {
        self.cost = Some(cost.into());
        self
    }

    /// Attach a price annotation.
    #[must_use]
    pub fn with_price(mut self, price: PriceAnnotation) -> Self {
        self.price = Some(price);
        self
    }

    /// Attach a flag.
    #[must_use]
    pub const fn with_flag(mut self, flag: char) -> Self {
        self.flag = Some(flag);
        self
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    /// The complete units, once interpolation has run.
    #[must_use]
    pub fn amount(&self) -> Option<Amount> {
        self.units.complete()
    }
}

impl fmt::Display for Posting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  ")?;
        if let Some(flag) = self.flag {
            write!(f, "{flag} ")?;
        }
        write!(f, "{}", self.account)?;
        if self.units != IncompleteAmount::empty() {
            write!(f, "  {}", self.units)?;
        }
        if let Some(cost) = &self.cost {
            write!(f, " {cost}")?;
        }
        if let Some(price) = &self.price {
            write!(f, " {price}")?;
        }
        Ok(())
    }
}

/// Declares the start of an account's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Open {
    /// Opening date.
    pub date: NaiveDate,
    /// Source location and metadata.
    pub meta: Meta,
    /// The account being opened.
    pub account: Account,
    /// Allowed currencies; empty means unconstrained.
    pub currencies: Vec<Currency>,
    /// The booking method for this account's lots.
    pub booking: Option<Booking>,
}

impl Open {
    /// Open an account on a date.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<Account>) -> Self {
        Self {
            date,
            meta: Meta::new(),
            account: account.into(),
            currencies: Vec::new(),
            booking: None,
        }
    }

    /// Constrain the allowed currencies.
    #[must_use]
    pub fn with_currencies(mut self, currencies: Vec<Currency>) -> Self {
        self.currencies = currencies;
        self
    }

    /// Set the booking method.
    #[must_use]
    pub const fn with_booking(mut self, booking: Booking) -> Self {
        self.booking = Some(booking);
        self
    }
}

impl fmt::Display for Open {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} open {}", self.date, self.account)?;
        if !self.currencies.is_empty() {
            let list: Vec<&str> = self.currencies.iter().map(Currency::as_str).collect();
            write!(f, " {}", list.join(","))?;
        }
        if let Some(booking) = self.booking {
            write!(f, " \"{booking}\"")?;
        }
        Ok(())
    }
}

/// Ends an account's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Close {
    /// Closing date.
    pub date: NaiveDate,
    /// Source location and metadata.
    pub meta: Meta,
    /// The account being closed.
    pub account: Account,
}

impl Close {
    /// Close an account on a date.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<Account>) -> Self {
        Self {
            date,
            meta: Meta::new(),
            account: account.into(),
        }
    }
}

impl fmt::Display for Close {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} close {}", self.date, self.account)
    }
}

/// Declares a commodity; an attachment point for per-currency metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commodity {
    /// Declaration date.
    pub date: NaiveDate,
    /// Source location and metadata.
    pub meta: Meta,
    /// The declared currency.
    pub currency: Currency,
}

impl Commodity {
    /// Declare a commodity on a date.
    #[must_use]
    pub fn new(date: NaiveDate, currency: impl Into<Currency>) -> Self {
        Self {
            date,
            meta: Meta::new(),
            currency: currency.into(),
        }
    }
}

impl fmt::Display for Commodity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} commodity {}", self.date, self.currency)
    }
}

/// Asserts an account's balance in one currency at the start of a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAssertion {
    /// Assertion date.
    pub date: NaiveDate,
    /// Source location and metadata.
    pub meta: Meta,
    /// The asserted account.
    pub account: Account,
    /// The expected amount.
    pub amount: Amount,
    /// An explicit tolerance (the `~` form), when given.
    pub tolerance: Option<Decimal>,
    /// The observed difference, attached by validation on failure.
    pub diff: Option<Amount>,
}

impl BalanceAssertion {
    /// Assert a balance on a date.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<Account>, amount: Amount) -> Self {
        Self {
            date,
            meta: Meta::new(),
            account: account.into(),
            amount,
            tolerance: None,
            diff: None,
        }
    }

    /// Set an explicit tolerance.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: Decimal) -> Self {
        self.tolerance = Some(tolerance);
        self
    }
}

impl fmt::Display for BalanceAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} balance {} ", self.date, self.account)?;
        if let Some(tolerance) = self.tolerance {
            write!(
                f,
                "{} ~ {} {}",
                self.amount.number, tolerance, self.amount.currency
            )
        } else {
            write!(f, "{}", self.amount)
        }
    }
}

/// Requests automatic padding before the next balance assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pad {
    /// Pad date.
    pub date: NaiveDate,
    /// Source location and metadata.
    pub meta: Meta,
    /// The account to pad.
    pub account: Account,
    /// The account the padding amount is drawn from.
    pub source_account: Account,
}

impl Pad {
    /// Pad an account from a source account.
    #[must_use]
    pub fn new(
        date: NaiveDate,
        account: impl Into<Account>,
        source_account: impl Into<Account>,
    ) -> Self {
        Self {
            date,
            meta: Meta::new(),
            account: account.into(),
            source_account: source_account.into(),
        }
    }
}

impl fmt::Display for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pad {} {}", self.date, self.account, self.source_account)
    }
}

/// The compound directive: a set of postings that must balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction date.
    pub date: NaiveDate,
    /// Source location and metadata.
    pub meta: Meta,
    /// The transaction flag (`*`, `!`, or a single letter).
    pub flag: char,
    /// The payee, when given.
    pub payee: Option<String>,
    /// The narration.
    pub narration: String,
    /// `#tag`s on the transaction.
    pub tags: Vec<String>,
    /// `^link`s on the transaction.
    pub links: Vec<String>,
    /// The legs.
    pub postings: Vec<Posting>,
}

impl Transaction {
    /// A complete (`*`) transaction with a narration.
    #[must_use]
    pub fn new(date: NaiveDate, narration: impl Into<String>) -> Self {
        Self {
            date,
            meta: Meta::new(),
            flag: '*',
            payee: None,
            narration: narration.into(),
            tags: Vec::new(),
            links: Vec::new(),
            postings: Vec::new(),
        }
    }

    /// Set the flag.
    #[must_use]
    pub const fn with_flag(mut self, flag: char) -> Self {
        self.flag = flag;
        self
    }

    /// Set the payee.
    #[must_use]
    pub fn with_payee(mut self, payee: impl Into<String>) -> Self {
        self.payee = Some(payee.into());
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add a link.
    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.links.push(link.into());
        self
    }

    /// Add a posting.
    #[must_use]
    pub fn with_posting(mut self, posting: Posting) -> Self {
        self.postings.push(posting);
        self
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.date, self.flag)?;
        if let Some(payee) = &self.payee {
            write!(f, "\"{payee}\" ")?;
        }
        write!(f, "\"{}\"", self.narration)?;
        for tag in &self.tags {
            write!(f, " #{tag}")?;
        }
        for link in &self.links {
            write!(f, " ^{link}")?;
        }
        for posting in &self.postings {
            write!(f, "\n{posting}")?;
        }
        Ok(())
    }
}

/// A dated note on an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Note date.
    pub date: NaiveDate,
    /// Source location and metadata.
    pub meta: Meta,
    /// The annotated account.
    pub account: Account,
    /// The note text.
    pub comment: String,
}

impl Note {
    /// Attach a note to an account.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<Account>, comment: impl Into<String>) -> Self {
        Self {
            date,
            meta: Meta::new(),
            account: account.into(),
            comment: comment.into(),
        }
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} note {} \"{}\"", self.date, self.account, self.comment)
    }
}

/// Associates an external document file with an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Document date.
    pub date: NaiveDate,
    /// Source location and metadata.
    pub meta: Meta,
    /// The associated account.
    pub account: Account,
    /// Path of the document file.
    pub filename: String,
}

impl Document {
    /// Attach a document to an account.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<Account>, filename: impl Into<String>) -> Self {
        Self {
            date,
            meta: Meta::new(),
            account: account.into(),
            filename: filename.into(),
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} document {} \"{}\"", self.date, self.account, self.filename)
    }
}

/// Records a named event value change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event date.
    pub date: NaiveDate,
    /// Source location and metadata.
    pub meta: Meta,
    /// The event name (e.g. "location").
    pub name: String,
    /// The new value.
    pub value: String,
}

impl Event {
    /// Record an event.
    #[must_use]
    pub fn new(date: NaiveDate, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            date,
            meta: Meta::new(),
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} event \"{}\" \"{}\"", self.date, self.name, self.value)
    }
}

/// Stores a named query string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Query date.
    pub date: NaiveDate,
    /// Source location and metadata.
    pub meta: Meta,
    /// The query name.
    pub name: String,
    /// The query string.
    pub query: String,
}

impl Query {
    /// Store a named query.
    #[must_use]
    pub fn new(date: NaiveDate, name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            date,
            meta: Meta::new(),
            name: name.into(),
            query: query.into(),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} query \"{}\" \"{}\"", self.date, self.name, self.query)
    }
}

/// Records the price of a currency in another currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Price date.
    pub date: NaiveDate,
    /// Source location and metadata.
    pub meta: Meta,
    /// The currency being priced.
    pub currency: Currency,
    /// Its price in the quote currency.
    pub amount: Amount,
}

impl Price {
    /// Record a price.
    #[must_use]
    pub fn new(date: NaiveDate, currency: impl Into<Currency>, amount: Amount) -> Self {
        Self {
            date,
            meta: Meta::new(),
            currency: currency.into(),
            amount,
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} price {} {}", self.date, self.currency, self.amount)
    }
}

/// A user-defined directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Custom {
    /// Directive date.
    pub date: NaiveDate,
    /// Source location and metadata.
    pub meta: Meta,
    /// The custom type name.
    pub name: String,
    /// Free-form values.
    pub values: Vec<MetaValue>,
}

impl Custom {
    /// A custom directive with a type name.
    #[must_use]
    pub fn new(date: NaiveDate, name: impl Into<String>) -> Self {
        Self {
            date,
            meta: Meta::new(),
            name: name.into(),
            values: Vec::new(),
        }
    }

    /// Add a value.
    #[must_use]
    pub fn with_value(mut self, value: MetaValue) -> Self {
        self.values.push(value);
        self
    }
}

impl fmt::Display for Custom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} custom \"{}\"", self.date, self.name)?;
        for value in &self.values {
            write!(f, " {value}")?;
        }
        Ok(())
    }
}

/// Any ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Directive {
    /// Account lifecycle start.
    Open(Open),
    /// Account lifecycle end.
    Close(Close),
    /// Commodity declaration.
    Commodity(Commodity),
    /// Balance assertion.
    Balance(BalanceAssertion),
    /// Padding request.
    Pad(Pad),
    /// A transaction with postings.
    Transaction(Transaction),
    /// A note on an account.
    Note(Note),
    /// A document attached to an account.
    Document(Document),
    /// A named event value.
    Event(Event),
    /// A stored query.
    Query(Query),
    /// A price point.
    Price(Price),
    /// A user-defined entry.
    Custom(Custom),
}

/// Apply `$body` to the inner struct of any directive variant.
macro_rules! for_each_variant {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            Directive::Open($inner) => $body,
            Directive::Close($inner) => $body,
            Directive::Commodity($inner) => $body,
            Directive::Balance($inner) => $body,
            Directive::Pad($inner) => $body,
            Directive::Transaction($inner) => $body,
            Directive::Note($inner) => $body,
            Directive::Document($inner) => $body,
            Directive::Event($inner) => $body,
            Directive::Query($inner) => $body,
            Directive::Price($inner) => $body,
            Directive::Custom($inner) => $body,
        }
    };
}

impl Directive {
    /// The directive's date.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        for_each_variant!(self, e => e.date)
    }

    /// The directive's source location and metadata.
    #[must_use]
    pub const fn meta(&self) -> &Meta {
        for_each_variant!(self, e => &e.meta)
    }

    /// Mutable access to the metadata.
    pub fn meta_mut(&mut self) -> &mut Meta {
        for_each_variant!(self, e => &mut e.meta)
    }

    /// The keyword this directive uses in the input format.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Open(_) => "open",
            Self::Close(_) => "close",
            Self::Commodity(_) => "commodity",
            Self::Balance(_) => "balance",
            Self::Pad(_) => "pad",
            Self::Transaction(_) => "transaction",
            Self::Note(_) => "note",
            Self::Document(_) => "document",
            Self::Event(_) => "event",
            Self::Query(_) => "query",
            Self::Price(_) => "price",
            Self::Custom(_) => "custom",
        }
    }

    /// The accounts this directive references.
    #[must_use]
    pub fn accounts(&self) -> Vec<&Account> {
        match self {
            Self::Open(e) => vec![&e.account],
            Self::Close(e) => vec![&e.account],
            Self::Balance(e) => vec![&e.account],
            Self::Pad(e) => vec![&e.account, &e.source_account],
            Self::Transaction(e) => e.postings.iter().map(|p| &p.account).collect(),
            Self::Note(e) => vec![&e.account],
            Self::Document(e) => vec![&e.account],
            Self::Commodity(_) | Self::Event(_) | Self::Query(_) | Self::Price(_) | Self::Custom(_) => {
                Vec::new()
            }
        }
    }

    /// The same-date ordering rank: opens first, balance assertions next,
    /// documents after ordinary entries, closes last.
    #[must_use]
    pub const fn sort_rank(&self) -> i8 {
        match self {
            Self::Open(_) => -2,
            Self::Balance(_) => -1,
            Self::Document(_) => 1,
            Self::Close(_) => 2,
            _ => 0,
        }
    }

    /// Whether this directive may reference an account after its Close,
    /// provided the account was once open.
    #[must_use]
    pub const fn allowed_after_close(&self) -> bool {
        matches!(self, Self::Balance(_) | Self::Note(_) | Self::Document(_))
    }

    /// The transaction, if this is one.
    #[must_use]
    pub const fn as_transaction(&self) -> Option<&Transaction> {
        match self {
            Self::Transaction(t) => Some(t),
            _ => None,
        }
    }

    /// The balance assertion, if this is one.
    #[must_use]
    pub const fn as_balance(&self) -> Option<&BalanceAssertion> {
        match self {
            Self::Balance(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for_each_variant!(self, e => fmt::Display::fmt(e, f))
    }
}

macro_rules! directive_from {
    ($($variant:ident($inner:ty)),* $(,)?) => {
        $(impl From<$inner> for Directive {
            fn from(e: $inner) -> Self {
                Self::$variant(e)
            }
        })*
    };
}

directive_from!(
    Open(Open),
    Close(Close),
    Commodity(Commodity),
    Balance(BalanceAssertion),
    Pad(Pad),
    Transaction(Transaction),
    Note(Note),
    Document(Document),
    Event(Event),
    Query(Query),
    Price(Price),
    Custom(Custom),
);

/// Sort entries by (date, same-date rank, line number).
///
/// The sort is stable, so entries that tie on all three keys keep their
/// input order.
pub fn sort_entries(entries: &mut [Directive]) {
    entries.sort_by(|a, b| {
        a.date()
            .cmp(&b.date())
            .then_with(|| a.sort_rank().cmp(&b.sort_rank()))
            .then_with(|| a.meta().lineno.cmp(&b.meta().lineno))
    });
}
