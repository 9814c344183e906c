//! The ledger grammar, written with chumsky combinators.
//!
//! One parser per syntactic form, composed bottom-up: primitives (dates,
//! numbers, strings, names), then amounts and cost specs, then postings
//! and directives, then the file structure with per-line error recovery.

use chumsky::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use chrono::NaiveDate;
use tally_core::{
    Account, Amount, BalanceAssertion, Booking, Close, Commodity, CostSpec, Currency, Custom,
    Directive, Document, Event, IncompleteAmount, MetaValue, Note, Open, Pad, Posting, Price,
    PriceAnnotation, Query, Symbol, Transaction,
};

use crate::{LineIndex, ParseError, ParseResult};

type ParserExtra<'a> = extra::Err<Rich<'a, char>>;

/// Top-level items a file can contain.
#[derive(Debug, Clone)]
enum ParsedItem {
    Entry(Directive),
    Option(String, String),
    Include(String),
    Plugin(String, Option<String>),
    Pushtag(String),
    Poptag(String),
    Comment,
}

/// Parse a whole source file.
pub(crate) fn parse(source: &str, filename: Option<&str>) -> ParseResult {
    let (items, parse_errors) = file().parse(source).into_output_errors();
    let index = LineIndex::new(source);
    let filename: Option<Symbol> = filename.map(Symbol::from);

    let mut result = ParseResult::default();
    let mut tag_stack: Vec<String> = Vec::new();

    for item in items.unwrap_or_default().into_iter().flatten() {
        match item {
            ParsedItem::Entry(mut entry) => {
                stamp_locations(&mut entry, &index, filename.as_ref());
                if let Directive::Transaction(txn) = &mut entry {
                    for tag in &tag_stack {
                        if !txn.tags.contains(tag) {
                            txn.tags.push(tag.clone());
                        }
                    }
                }
                result.directives.push(entry);
            }
            ParsedItem::Option(key, value) => result.options.push((key, value)),
            ParsedItem::Include(path) => result.includes.push(path),
            ParsedItem::Plugin(name, config) => result.plugins.push((name, config)),
            ParsedItem::Pushtag(tag) => tag_stack.push(tag),
            ParsedItem::Poptag(tag) => {
                if let Some(at) = tag_stack.iter().rposition(|t| *t == tag) {
                    tag_stack.remove(at);
                }
            }
            ParsedItem::Comment => {}
        }
    }

    result.errors = parse_errors
        .into_iter()
        .map(|error| ParseError {
            message: error.to_string(),
            lineno: index.line_of(error.span().start),
        })
        .collect();

    result
}

/// Convert the byte offsets stashed in `lineno` during parsing into
/// 1-based line numbers, and stamp the source filename.
fn stamp_locations(entry: &mut Directive, index: &LineIndex, filename: Option<&Symbol>) {
    let meta = entry.meta_mut();
    meta.lineno = index.line_of(meta.lineno as usize);
    meta.filename = filename.cloned();
    if let Directive::Transaction(txn) = entry {
        for posting in &mut txn.postings {
            posting.meta.lineno = index.line_of(posting.meta.lineno as usize);
            posting.meta.filename = filename.cloned();
        }
    }
}

// ============================================================================
// File structure
// ============================================================================

fn file<'a>() -> impl Parser<'a, &'a str, Vec<Option<ParsedItem>>, ParserExtra<'a>> {
    skippable().ignore_then(
        entry()
            .map(Some)
            .recover_with(via_parser(
                // Skip one bad line and report it.
                any().then(none_of("\r\n").repeated()).to(None),
            ))
            .then_ignore(line_tail())
            .then_ignore(skippable())
            .repeated()
            .collect(),
    )
}

/// Blank lines, comment lines, and org-mode section headers.
fn skippable<'a>() -> impl Parser<'a, &'a str, (), ParserExtra<'a>> + Clone {
    choice((
        ws().then(comment().or_not()).then(newline()).ignored(),
        just('*').then(none_of("\r\n").repeated()).then(newline()).ignored(),
    ))
    .repeated()
    .ignored()
}

/// The rest of the current line: spaces, an optional comment, then a
/// newline or the end of input.
fn line_tail<'a>() -> impl Parser<'a, &'a str, (), ParserExtra<'a>> + Clone {
    ws().then(comment().or_not())
        .ignored()
        .then_ignore(newline().or(end()))
}

fn entry<'a>() -> impl Parser<'a, &'a str, ParsedItem, ParserExtra<'a>> {
    choice((
        dated_entry().map(ParsedItem::Entry),
        option_line(),
        include_line(),
        plugin_line(),
        pushtag_line(),
        poptag_line(),
        comment().to(ParsedItem::Comment),
    ))
}

fn ws<'a>() -> impl Parser<'a, &'a str, (), ParserExtra<'a>> + Clone {
    one_of(" \t").repeated().ignored()
}

fn ws1<'a>() -> impl Parser<'a, &'a str, (), ParserExtra<'a>> + Clone {
    one_of(" \t").repeated().at_least(1).ignored()
}

fn newline<'a>() -> impl Parser<'a, &'a str, (), ParserExtra<'a>> + Clone {
    just('\r').or_not().then(just('\n')).ignored()
}

fn comment<'a>() -> impl Parser<'a, &'a str, (), ParserExtra<'a>> + Clone {
    just(';').then(none_of("\r\n").repeated()).ignored()
}

/// Indentation marking a continuation line: two spaces or a tab.
fn indent<'a>() -> impl Parser<'a, &'a str, (), ParserExtra<'a>> + Clone {
    choice((just("  ").ignored(), just('\t').ignored())).then(ws()).ignored()
}

/// A continuation line holding `item`: newline, skipped comment lines,
/// then the indented item.
fn body_line<'a, T, P>(item: P) -> impl Parser<'a, &'a str, T, ParserExtra<'a>> + Clone
where
    P: Parser<'a, &'a str, T, ParserExtra<'a>> + Clone,
{
    newline()
        .ignore_then(ws().then(comment()).then(newline()).repeated())
        .ignore_then(indent())
        .ignore_then(item)
        .then_ignore(ws())
        .then_ignore(comment().or_not())
}

// ============================================================================
// Top-level non-dated lines
// ============================================================================

fn option_line<'a>() -> impl Parser<'a, &'a str, ParsedItem, ParserExtra<'a>> {
    just("option")
        .ignore_then(ws1())
        .ignore_then(string())
        .then_ignore(ws1())
        .then(string())
        .map(|(key, value)| ParsedItem::Option(key, value))
}

fn include_line<'a>() -> impl Parser<'a, &'a str, ParsedItem, ParserExtra<'a>> {
    just("include")
        .ignore_then(ws1())
        .ignore_then(string())
        .map(ParsedItem::Include)
}

fn plugin_line<'a>() -> impl Parser<'a, &'a str, ParsedItem, ParserExtra<'a>> {
    just("plugin")
        .ignore_then(ws1())
        .ignore_then(string())
        .then(ws1().ignore_then(string()).or_not())
        .map(|(name, config)| ParsedItem::Plugin(name, config))
}

fn pushtag_line<'a>() -> impl Parser<'a, &'a str, ParsedItem, ParserExtra<'a>> {
    just("pushtag")
        .ignore_then(ws1())
        .ignore_then(just('#'))
        .ignore_then(tag_name())
        .map(ParsedItem::Pushtag)
}

fn poptag_line<'a>() -> impl Parser<'a, &'a str, ParsedItem, ParserExtra<'a>> {
    just("poptag")
        .ignore_then(ws1())
        .ignore_then(just('#'))
        .ignore_then(tag_name())
        .map(ParsedItem::Poptag)
}

// ============================================================================
// Primitives
// ============================================================================

fn digits<'a>() -> impl Parser<'a, &'a str, &'a str, ParserExtra<'a>> + Clone {
    one_of("0123456789").repeated().at_least(1).to_slice()
}

fn date<'a>() -> impl Parser<'a, &'a str, NaiveDate, ParserExtra<'a>> + Clone {
    digits()
        .then_ignore(one_of("-/"))
        .then(digits())
        .then_ignore(one_of("-/"))
        .then(digits())
        .try_map(|((year, month), day): ((&str, &str), &str), span| {
            let year: i32 = year.parse().map_err(|_| Rich::custom(span, "invalid year"))?;
            let month: u32 = month.parse().map_err(|_| Rich::custom(span, "invalid month"))?;
            let day: u32 = day.parse().map_err(|_| Rich::custom(span, "invalid day"))?;
            NaiveDate::from_ymd_opt(year, month, day)
                .ok_or_else(|| Rich::custom(span, "invalid date"))
        })
}

/// A decimal number: optional sign, comma-grouped integer part, optional
/// fraction; a bare leading-dot fraction is accepted too.
fn number<'a>() -> impl Parser<'a, &'a str, Decimal, ParserExtra<'a>> + Clone {
    let integer = digits().then(just(',').then(digits()).repeated());
    let fraction = just('.').then(digits());
    one_of("-+")
        .or_not()
        .then(choice((
            integer.then(fraction.clone().or_not()).ignored(),
            fraction.ignored(),
        )))
        .to_slice()
        .try_map(|s: &str, span| {
            Decimal::from_str(&s.replace(',', ""))
                .map_err(|_| Rich::custom(span, "invalid number"))
        })
}

/// A double-quoted string with `\"` and `\\` escapes.
fn string<'a>() -> impl Parser<'a, &'a str, String, ParserExtra<'a>> + Clone {
    just('"')
        .ignore_then(
            choice((
                none_of("\"\\"),
                just('\\').ignore_then(any()).map(|c| match c {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                }),
            ))
            .repeated()
            .collect::<String>(),
        )
        .then_ignore(just('"'))
}

fn account<'a>() -> impl Parser<'a, &'a str, Account, ParserExtra<'a>> + Clone {
    let root = one_of("ABCDEFGHIJKLMNOPQRSTUVWXYZ")
        .then(one_of("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-").repeated());
    let component = one_of("ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789")
        .then(one_of("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-").repeated());
    root.then(just(':').then(component).repeated().at_least(1))
        .to_slice()
        .map(Account::from)
}

fn currency<'a>() -> impl Parser<'a, &'a str, Currency, ParserExtra<'a>> + Clone {
    let leg = one_of("ABCDEFGHIJKLMNOPQRSTUVWXYZ")
        .then(one_of("ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789'._-").repeated());
    leg.clone()
        .then(just('/').then(leg).or_not())
        .to_slice()
        .map(Currency::from)
}

fn tag_name<'a>() -> impl Parser<'a, &'a str, String, ParserExtra<'a>> + Clone {
    one_of("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_/.")
        .repeated()
        .at_least(1)
        .collect()
}

fn meta_key<'a>() -> impl Parser<'a, &'a str, String, ParserExtra<'a>> + Clone {
    one_of("abcdefghijklmnopqrstuvwxyz")
        .then(one_of("abcdefghijklmnopqrstuvwxyz0123456789-_").repeated())
        .to_slice()
        .map(String::from)
}

fn meta_value<'a>() -> impl Parser<'a, &'a str, MetaValue, ParserExtra<'a>> + Clone {
    choice((
        date().map(MetaValue::Date),
        amount().map(MetaValue::Amount),
        number().map(MetaValue::Number),
        string().map(MetaValue::String),
        just("TRUE").to(MetaValue::Bool(true)),
        just("FALSE").to(MetaValue::Bool(false)),
        account().map(MetaValue::Account),
        currency().map(MetaValue::Currency),
        just('#').ignore_then(tag_name()).map(MetaValue::Tag),
        just('^').ignore_then(tag_name()).map(MetaValue::Link),
    ))
}

/// A `key: value` metadata line body (without the indentation).
fn meta_line<'a>() -> impl Parser<'a, &'a str, (String, MetaValue), ParserExtra<'a>> + Clone {
    meta_key()
        .then_ignore(just(':'))
        .then_ignore(ws())
        .then(meta_value())
}

// ============================================================================
// Amounts, costs, prices
// ============================================================================

fn amount<'a>() -> impl Parser<'a, &'a str, Amount, ParserExtra<'a>> + Clone {
    number()
        .then_ignore(ws1())
        .then(currency())
        .map(|(number, currency)| Amount { number, currency })
}

/// An amount in which either the number or the currency may be missing.
fn incomplete_amount<'a>() -> impl Parser<'a, &'a str, IncompleteAmount, ParserExtra<'a>> + Clone {
    choice((
        number()
            .then(ws1().ignore_then(currency()).or_not())
            .map(|(number, currency)| IncompleteAmount {
                number: Some(number),
                currency,
            }),
        currency().map(|currency| IncompleteAmount {
            number: None,
            currency: Some(currency),
        }),
    ))
}

/// One comma-separated component of a cost spec.
#[derive(Debug, Clone)]
enum CostComp {
    PerUnit(Decimal),
    Total(Decimal),
    Currency(Currency),
    Date(NaiveDate),
    Label(String),
    Merge,
}

fn cost_comp<'a>() -> impl Parser<'a, &'a str, Vec<CostComp>, ParserExtra<'a>> + Clone {
    choice((
        just('*').to(vec![CostComp::Merge]),
        date().map(|d| vec![CostComp::Date(d)]),
        string().map(|l| vec![CostComp::Label(l)]),
        // NUMBER [# NUMBER] or # NUMBER
        number()
            .then(ws().ignore_then(just('#')).ignore_then(ws()).ignore_then(number()).or_not())
            .map(|(per, total)| {
                let mut comps = vec![CostComp::PerUnit(per)];
                if let Some(total) = total {
                    comps.push(CostComp::Total(total));
                }
                comps
            }),
        just('#')
            .ignore_then(ws())
            .ignore_then(number())
            .map(|total| vec![CostComp::Total(total)]),
        currency().map(|c| vec![CostComp::Currency(c)]),
    ))
}

fn assemble_cost(comps: Vec<Vec<CostComp>>, total_form: bool) -> CostSpec {
    let mut spec = CostSpec::empty();
    for comp in comps.into_iter().flatten() {
        match comp {
            CostComp::PerUnit(n) => {
                if total_form {
                    spec.number_total = Some(n);
                } else {
                    spec.number_per = Some(n);
                }
            }
            CostComp::Total(n) => spec.number_total = Some(n),
            CostComp::Currency(c) => spec.currency = Some(c),
            CostComp::Date(d) => spec.date = Some(d),
            CostComp::Label(l) => spec.label = Some(l),
            CostComp::Merge => spec.merge = true,
        }
    }
    spec
}

fn cost_spec<'a>() -> impl Parser<'a, &'a str, CostSpec, ParserExtra<'a>> + Clone {
    let comps = |open: &'static str, close: &'static str| {
        just(open)
            .ignore_then(ws())
            .ignore_then(
                cost_comp()
                    .then_ignore(ws())
                    .separated_by(just(',').then(ws()))
                    .collect::<Vec<_>>(),
            )
            .then_ignore(just(close))
    };
    choice((
        comps("{{", "}}").map(|c| assemble_cost(c, true)),
        comps("{", "}").map(|c| assemble_cost(c, false)),
    ))
}

fn price_annotation<'a>() -> impl Parser<'a, &'a str, PriceAnnotation, ParserExtra<'a>> + Clone {
    choice((
        just("@@")
            .ignore_then(ws())
            .ignore_then(incomplete_amount().or_not())
            .map(|a| PriceAnnotation::Total(a.unwrap_or_default())),
        just('@')
            .ignore_then(ws())
            .ignore_then(incomplete_amount().or_not())
            .map(|a| PriceAnnotation::Unit(a.unwrap_or_default())),
    ))
}

// ============================================================================
// Postings and transactions
// ============================================================================

fn flag_char<'a>() -> impl Parser<'a, &'a str, char, ParserExtra<'a>> + Clone {
    one_of("*!PSTCURM")
}

#[allow(clippy::cast_possible_truncation)]
fn posting<'a>() -> impl Parser<'a, &'a str, Posting, ParserExtra<'a>> + Clone {
    flag_char()
        .then_ignore(ws1())
        .or_not()
        .then(account())
        .then(ws1().ignore_then(incomplete_amount()).or_not())
        .then(ws().ignore_then(cost_spec()).or_not())
        .then(ws().ignore_then(price_annotation()).or_not())
        .map_with(|((((flag, account), units), cost), price), e| {
            let mut posting = Posting::incomplete(account, units.unwrap_or_default());
            posting.flag = flag;
            posting.cost = cost.map(Into::into);
            posting.price = price;
            posting.meta.lineno = e.span().start as u32;
            posting
        })
}

/// A line in a transaction body: a posting or a metadata line.
#[derive(Debug, Clone)]
enum TxnItem {
    Posting(Posting),
    Meta(String, MetaValue),
}

fn transaction<'a>() -> impl Parser<'a, &'a str, Directive, ParserExtra<'a>> + Clone {
    let flag = choice((just("txn").to('*'), flag_char()));
    let strings = string().then(ws1().ignore_then(string()).or_not());
    let tag_or_link = choice((
        just('#').ignore_then(tag_name()).map(|t| (true, t)),
        just('^').ignore_then(tag_name()).map(|l| (false, l)),
    ));

    date()
        .then_ignore(ws1())
        .then(flag)
        .then(ws1().ignore_then(strings).or_not())
        .then(ws1().ignore_then(tag_or_link).repeated().collect::<Vec<_>>())
        .then_ignore(ws())
        .then_ignore(comment().or_not())
        .then(
            body_line(choice((
                meta_line().map(|(k, v)| TxnItem::Meta(k, v)),
                posting().map(TxnItem::Posting),
            )))
            .repeated()
            .collect::<Vec<_>>(),
        )
        .map(|((((date, flag), strings), markers), items)| {
            let mut txn = Transaction::new(date, "").with_flag(flag);
            if let Some((first, second)) = strings {
                match second {
                    Some(narration) => {
                        txn.payee = Some(first);
                        txn.narration = narration;
                    }
                    None => txn.narration = first,
                }
            }
            for (is_tag, name) in markers {
                if is_tag {
                    txn.tags.push(name);
                } else {
                    txn.links.push(name);
                }
            }
            for item in items {
                match item {
                    TxnItem::Posting(posting) => txn.postings.push(posting),
                    TxnItem::Meta(key, value) => {
                        // A metadata line binds to the posting above it,
                        // or to the transaction when none has appeared.
                        if let Some(last) = txn.postings.last_mut() {
                            last.meta.kv.insert(key, value);
                        } else {
                            txn.meta.kv.insert(key, value);
                        }
                    }
                }
            }
            Directive::Transaction(txn)
        })
}

// ============================================================================
// Simple dated directives
// ============================================================================

fn keyword<'a>(word: &'static str) -> impl Parser<'a, &'a str, (), ParserExtra<'a>> + Clone {
    just(word).then(ws1()).ignored()
}

fn open<'a>() -> impl Parser<'a, &'a str, Directive, ParserExtra<'a>> + Clone {
    let currencies = currency()
        .separated_by(just(',').then(ws()))
        .at_least(1)
        .collect::<Vec<_>>();
    date()
        .then_ignore(ws1())
        .then_ignore(keyword("open"))
        .then(account())
        .then(ws1().ignore_then(currencies).or_not())
        .then(ws().ignore_then(string()).or_not())
        .try_map(|(((date, account), currencies), booking), span| {
            let mut open = Open::new(date, account);
            open.currencies = currencies.unwrap_or_default();
            if let Some(name) = booking {
                let method = Booking::from_str(&name)
                    .map_err(|message| Rich::custom(span, message))?;
                open.booking = Some(method);
            }
            Ok(Directive::Open(open))
        })
}

fn close<'a>() -> impl Parser<'a, &'a str, Directive, ParserExtra<'a>> + Clone {
    date()
        .then_ignore(ws1())
        .then_ignore(keyword("close"))
        .then(account())
        .map(|(date, account)| Close::new(date, account).into())
}

fn commodity<'a>() -> impl Parser<'a, &'a str, Directive, ParserExtra<'a>> + Clone {
    date()
        .then_ignore(ws1())
        .then_ignore(keyword("commodity"))
        .then(currency())
        .map(|(date, currency)| Commodity::new(date, currency).into())
}

fn balance<'a>() -> impl Parser<'a, &'a str, Directive, ParserExtra<'a>> + Clone {
    date()
        .then_ignore(ws1())
        .then_ignore(keyword("balance"))
        .then(account())
        .then_ignore(ws1())
        .then(number())
        .then(ws().ignore_then(just('~')).ignore_then(ws()).ignore_then(number()).or_not())
        .then_ignore(ws1())
        .then(currency())
        .map(|((((date, account), number), tolerance), currency)| {
            let mut assertion =
                BalanceAssertion::new(date, account, Amount { number, currency });
            assertion.tolerance = tolerance;
            Directive::Balance(assertion)
        })
}

fn pad<'a>() -> impl Parser<'a, &'a str, Directive, ParserExtra<'a>> + Clone {
    date()
        .then_ignore(ws1())
        .then_ignore(keyword("pad"))
        .then(account())
        .then_ignore(ws1())
        .then(account())
        .map(|((date, account), source)| Pad::new(date, account, source).into())
}

fn note<'a>() -> impl Parser<'a, &'a str, Directive, ParserExtra<'a>> + Clone {
    date()
        .then_ignore(ws1())
        .then_ignore(keyword("note"))
        .then(account())
        .then_ignore(ws1())
        .then(string())
        .map(|((date, account), comment)| Note::new(date, account, comment).into())
}

fn document<'a>() -> impl Parser<'a, &'a str, Directive, ParserExtra<'a>> + Clone {
    date()
        .then_ignore(ws1())
        .then_ignore(keyword("document"))
        .then(account())
        .then_ignore(ws1())
        .then(string())
        .map(|((date, account), filename)| Document::new(date, account, filename).into())
}

fn event<'a>() -> impl Parser<'a, &'a str, Directive, ParserExtra<'a>> + Clone {
    date()
        .then_ignore(ws1())
        .then_ignore(keyword("event"))
        .then(string())
        .then_ignore(ws1())
        .then(string())
        .map(|((date, name), value)| Event::new(date, name, value).into())
}

fn query<'a>() -> impl Parser<'a, &'a str, Directive, ParserExtra<'a>> + Clone {
    date()
        .then_ignore(ws1())
        .then_ignore(keyword("query"))
        .then(string())
        .then_ignore(ws1())
        .then(string())
        .map(|((date, name), body)| Query::new(date, name, body).into())
}

fn price<'a>() -> impl Parser<'a, &'a str, Directive, ParserExtra<'a>> + Clone {
    date()
        .then_ignore(ws1())
        .then_ignore(keyword("price"))
        .then(currency())
        .then_ignore(ws1())
        .then(amount())
        .map(|((date, currency), amount)| Price::new(date, currency, amount).into())
}

fn custom<'a>() -> impl Parser<'a, &'a str, Directive, ParserExtra<'a>> + Clone {
    date()
        .then_ignore(ws1())
        .then_ignore(keyword("custom"))
        .then(string())
        .then(ws1().ignore_then(meta_value()).repeated().collect::<Vec<_>>())
        .map(|((date, name), values)| {
            let mut custom = Custom::new(date, name);
            custom.values = values;
            Directive::Custom(custom)
        })
}

/// Any dated directive, with following indented metadata lines attached
/// and the starting byte offset stashed for line stamping.
#[allow(clippy::cast_possible_truncation)]
fn dated_entry<'a>() -> impl Parser<'a, &'a str, Directive, ParserExtra<'a>> {
    let simple = choice((
        open(),
        close(),
        commodity(),
        balance(),
        pad(),
        note(),
        document(),
        event(),
        query(),
        price(),
        custom(),
    ))
    .then_ignore(ws())
    .then_ignore(comment().or_not())
    .then(body_line(meta_line()).repeated().collect::<Vec<_>>())
    .map(|(mut entry, kv)| {
        entry.meta_mut().kv.extend(kv);
        entry
    });

    choice((simple, transaction())).map_with(|mut entry, e| {
        entry.meta_mut().lineno = e.span().start as u32;
        entry
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tally_core::CostBasis;

    fn parse_ok(source: &str) -> Vec<Directive> {
        let result = crate::parse(source, None);
        assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
        result.directives
    }

    fn single(source: &str) -> Directive {
        let mut entries = parse_ok(source);
        assert_eq!(entries.len(), 1, "expected one directive: {entries:?}");
        entries.remove(0)
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_open_with_currencies_and_booking() {
        let entry = single("2024-01-01 open Assets:Bank:Checking USD,EUR \"FIFO\"\n");
        let Directive::Open(open) = entry else {
            panic!("expected open");
        };
        assert_eq!(open.account, "Assets:Bank:Checking");
        assert_eq!(open.currencies.len(), 2);
        assert_eq!(open.booking, Some(Booking::Fifo));
    }

    #[test]
    fn test_open_bad_booking_is_error() {
        let result = crate::parse("2024-01-01 open Assets:Bank \"SOMEDAY\"\n", None);
        assert_eq!(result.directives.len(), 0);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_close_commodity_pad() {
        let entries = parse_ok(
            "2024-01-01 close Assets:Bank\n\
             2024-01-02 commodity HOOL\n\
             2024-01-03 pad Assets:Bank Equity:Opening\n",
        );
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].kind_name(), "close");
        assert_eq!(entries[1].kind_name(), "commodity");
        assert_eq!(entries[2].kind_name(), "pad");
    }

    #[test]
    fn test_balance_with_tolerance() {
        let entry = single("2024-01-01 balance Assets:Bank 100.00 ~ 0.05 USD\n");
        let Directive::Balance(assertion) = entry else {
            panic!("expected balance");
        };
        assert_eq!(assertion.amount, Amount::new(dec!(100.00), "USD"));
        assert_eq!(assertion.tolerance, Some(dec!(0.05)));
    }

    #[test]
    fn test_note_document_event_query_price() {
        let entries = parse_ok(
            "2024-01-01 note Assets:Bank \"called the bank\"\n\
             2024-01-02 document Assets:Bank \"statement.pdf\"\n\
             2024-01-03 event \"location\" \"Berlin\"\n\
             2024-01-04 query \"food\" \"SELECT 1\"\n\
             2024-01-05 price HOOL 120.00 USD\n",
        );
        assert_eq!(entries.len(), 5);
        let Directive::Price(price) = &entries[4] else {
            panic!("expected price");
        };
        assert_eq!(price.currency, "HOOL");
        assert_eq!(price.amount.number, dec!(120.00));
    }

    #[test]
    fn test_custom_values() {
        let entry = single("2024-01-01 custom \"budget\" \"monthly\" TRUE 45.30 USD\n");
        let Directive::Custom(custom) = entry else {
            panic!("expected custom");
        };
        assert_eq!(custom.name, "budget");
        assert_eq!(
            custom.values,
            vec![
                MetaValue::String("monthly".into()),
                MetaValue::Bool(true),
                MetaValue::Amount(Amount::new(dec!(45.30), "USD")),
            ]
        );
    }

    #[test]
    fn test_simple_transaction() {
        let entry = single(
            "2024-01-15 * \"Coffee Shop\" \"Morning coffee\" #daily ^trip-2024\n  \
             Expenses:Food:Coffee  5.00 USD\n  \
             Assets:Cash\n",
        );
        let Directive::Transaction(txn) = entry else {
            panic!("expected transaction");
        };
        assert_eq!(txn.date, ymd(2024, 1, 15));
        assert_eq!(txn.flag, '*');
        assert_eq!(txn.payee.as_deref(), Some("Coffee Shop"));
        assert_eq!(txn.narration, "Morning coffee");
        assert_eq!(txn.tags, vec!["daily"]);
        assert_eq!(txn.links, vec!["trip-2024"]);
        assert_eq!(txn.postings.len(), 2);
        assert_eq!(
            txn.postings[0].amount(),
            Some(Amount::new(dec!(5.00), "USD"))
        );
        assert!(txn.postings[1].amount().is_none());
    }

    #[test]
    fn test_txn_keyword_and_bang_flag() {
        let entries = parse_ok(
            "2024-01-15 txn \"a\"\n  Assets:Cash  1.00 USD\n  Assets:Other\n\
             2024-01-16 ! \"b\"\n  Assets:Cash  1.00 USD\n  Assets:Other\n",
        );
        let flags: Vec<char> = entries
            .iter()
            .filter_map(|e| e.as_transaction().map(|t| t.flag))
            .collect();
        assert_eq!(flags, vec!['*', '!']);
    }

    #[test]
    fn test_posting_with_cost_and_price() {
        let entry = single(
            "2024-01-15 * \"Sell\"\n  \
             Assets:Stock  -10 HOOL {100.00 USD, 2023-06-01, \"lot1\"} @ 130.00 USD\n  \
             Assets:Cash  1300.00 USD\n",
        );
        let Directive::Transaction(txn) = entry else {
            panic!("expected transaction");
        };
        let posting = &txn.postings[0];
        assert_eq!(posting.amount(), Some(Amount::new(dec!(-10), "HOOL")));

        let Some(CostBasis::Incomplete(spec)) = &posting.cost else {
            panic!("expected cost spec");
        };
        assert_eq!(spec.number_per, Some(dec!(100.00)));
        assert_eq!(spec.currency.as_ref().unwrap(), &Currency::from("USD"));
        assert_eq!(spec.date, Some(ymd(2023, 6, 1)));
        assert_eq!(spec.label.as_deref(), Some("lot1"));

        let Some(PriceAnnotation::Unit(price)) = &posting.price else {
            panic!("expected unit price");
        };
        assert_eq!(price.complete(), Some(Amount::new(dec!(130.00), "USD")));
    }

    #[test]
    fn test_empty_and_total_cost_forms() {
        let entry = single(
            "2024-01-15 * \"Buy\"\n  \
             Assets:A  1 HOOL {}\n  \
             Assets:B  2 HOOL {{2000.00 USD}}\n  \
             Assets:C  3 HOOL {100.00 # 9.95 USD}\n  \
             Assets:Cash\n",
        );
        let Directive::Transaction(txn) = entry else {
            panic!("expected transaction");
        };

        let Some(CostBasis::Incomplete(empty)) = &txn.postings[0].cost else {
            panic!("expected cost");
        };
        assert!(empty.is_empty());

        let Some(CostBasis::Incomplete(total)) = &txn.postings[1].cost else {
            panic!("expected cost");
        };
        assert_eq!(total.number_total, Some(dec!(2000.00)));
        assert_eq!(total.number_per, None);

        let Some(CostBasis::Incomplete(compound)) = &txn.postings[2].cost else {
            panic!("expected cost");
        };
        assert_eq!(compound.number_per, Some(dec!(100.00)));
        assert_eq!(compound.number_total, Some(dec!(9.95)));
    }

    #[test]
    fn test_incomplete_amount_forms() {
        let entry = single(
            "2024-01-15 * \"partial\"\n  \
             Assets:A  USD\n  \
             Assets:B  20\n  \
             Assets:C  20 USD @\n  \
             Assets:D\n",
        );
        let Directive::Transaction(txn) = entry else {
            panic!("expected transaction");
        };
        assert_eq!(txn.postings[0].units, IncompleteAmount::currency_only("USD"));
        assert_eq!(txn.postings[1].units, IncompleteAmount::number_only(dec!(20)));
        assert_eq!(
            txn.postings[2].price,
            Some(PriceAnnotation::Unit(IncompleteAmount::empty()))
        );
        assert_eq!(txn.postings[3].units, IncompleteAmount::empty());
    }

    #[test]
    fn test_total_price_annotation() {
        let entry = single(
            "2024-01-15 * \"fx\"\n  \
             Assets:A  -100.00 USD @@ 85.00 EUR\n  \
             Assets:B  85.00 EUR\n",
        );
        let Directive::Transaction(txn) = entry else {
            panic!("expected transaction");
        };
        assert_eq!(
            txn.postings[0].price,
            Some(PriceAnnotation::Total(
                Amount::new(dec!(85.00), "EUR").into()
            ))
        );
    }

    #[test]
    fn test_metadata_lines() {
        let entry = single(
            "2024-01-15 * \"x\"\n  \
             invoice: \"INV-1\"\n  \
             Assets:A  1.00 USD\n  \
             checked: TRUE\n  \
             Assets:B\n",
        );
        let Directive::Transaction(txn) = entry else {
            panic!("expected transaction");
        };
        assert_eq!(
            txn.meta.kv.get("invoice"),
            Some(&MetaValue::String("INV-1".into()))
        );
        assert_eq!(txn.postings[0].meta.kv.get("checked"), Some(&MetaValue::Bool(true)));
    }

    #[test]
    fn test_directive_metadata() {
        let entry = single("2024-01-01 open Assets:Bank\n  importer: \"csv\"\n");
        assert_eq!(
            entry.meta().kv.get("importer"),
            Some(&MetaValue::String("csv".into()))
        );
    }

    #[test]
    fn test_options_includes_plugins() {
        let result = crate::parse(
            "option \"title\" \"My Ledger\"\n\
             include \"accounts.tally\"\n\
             plugin \"auto_accounts\"\n\
             plugin \"check_commodity\" \"strict\"\n",
            None,
        );
        assert!(result.errors.is_empty());
        assert_eq!(result.options, vec![("title".into(), "My Ledger".into())]);
        assert_eq!(result.includes, vec!["accounts.tally".to_string()]);
        assert_eq!(result.plugins.len(), 2);
        assert_eq!(result.plugins[1].1.as_deref(), Some("strict"));
    }

    #[test]
    fn test_pushtag_poptag() {
        let entries = parse_ok(
            "pushtag #trip\n\
             2024-01-15 * \"tagged\"\n  Assets:A  1.00 USD\n  Assets:B\n\
             poptag #trip\n\
             2024-01-16 * \"untagged\"\n  Assets:A  1.00 USD\n  Assets:B\n",
        );
        let tags: Vec<&[String]> = entries
            .iter()
            .filter_map(|e| e.as_transaction().map(|t| t.tags.as_slice()))
            .collect();
        assert_eq!(tags[0], ["trip".to_string()]);
        assert!(tags[1].is_empty());
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let entries = parse_ok(
            "; a file comment\n\
             \n\
             * an org-mode section\n\
             2024-01-01 open Assets:Bank ; trailing comment\n\
             \n\
             ; between entries\n\
             2024-01-02 close Assets:Bank\n",
        );
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_error_recovery_keeps_going() {
        let result = crate::parse(
            "2024-01-01 open Assets:Bank\n\
             this is not a directive\n\
             2024-01-02 close Assets:Bank\n",
            None,
        );
        assert_eq!(result.directives.len(), 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].lineno, 2);
    }

    #[test]
    fn test_line_numbers_and_filename() {
        let result = crate::parse(
            "; comment\n\
             2024-01-01 open Assets:Bank\n\
             2024-01-15 * \"x\"\n  Assets:A  1.00 USD\n  Assets:B\n",
            Some("main.tally"),
        );
        assert_eq!(result.directives[0].meta().lineno, 2);
        assert_eq!(
            result.directives[0].meta().filename.as_ref().unwrap().as_str(),
            "main.tally"
        );
        let txn = result.directives[1].as_transaction().unwrap();
        assert_eq!(result.directives[1].meta().lineno, 3);
        assert_eq!(txn.postings[0].meta.lineno, 4);
        assert_eq!(txn.postings[1].meta.lineno, 5);
    }

    #[test]
    fn test_number_forms() {
        let entry = single(
            "2024-01-15 * \"numbers\"\n  \
             Assets:A  1,234,567.89 USD\n  \
             Assets:B  -0.50 USD\n  \
             Assets:C  .25 USD\n  \
             Assets:D\n",
        );
        let Directive::Transaction(txn) = entry else {
            panic!("expected transaction");
        };
        assert_eq!(txn.postings[0].units.number, Some(dec!(1234567.89)));
        assert_eq!(txn.postings[1].units.number, Some(dec!(-0.50)));
        assert_eq!(txn.postings[2].units.number, Some(dec!(0.25)));
    }

    #[test]
    fn test_string_escapes() {
        let entry = single("2024-01-01 note Assets:Bank \"say \\\"hi\\\" \\\\ done\"\n");
        let Directive::Note(note) = entry else {
            panic!("expected note");
        };
        assert_eq!(note.comment, "say \"hi\" \\ done");
    }

    /// Strip source locations so reprinted entries compare by content.
    fn scrubbed(mut entries: Vec<Directive>) -> Vec<Directive> {
        for entry in &mut entries {
            *entry.meta_mut() = tally_core::Meta::new();
            if let Directive::Transaction(txn) = entry {
                for posting in &mut txn.postings {
                    posting.meta = tally_core::Meta::new();
                }
            }
        }
        entries
    }

    #[test]
    fn test_print_reparse_roundtrip() {
        let source = "2024-01-01 open Assets:Bank:Checking USD\n\
             2024-01-15 * \"Shop\" \"Weekly groceries\"\n  \
             Expenses:Food  45.30 USD\n  \
             Assets:Bank:Checking  -45.30 USD\n\
             2024-02-01 balance Assets:Bank:Checking -45.30 USD\n";
        let first = parse_ok(source);

        let printed: String = first.iter().map(|d| format!("{d}\n")).collect();
        let second = parse_ok(&printed);

        assert_eq!(scrubbed(first), scrubbed(second));
    }
}
