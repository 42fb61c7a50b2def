//! Statement parser: applies a bank profile to raw rows
//!
//! Every input row yields either one `RawTransactionRecord` or one skipped-row
//! diagnostic. Structural problems are `RowParse`; dates that cannot be read
//! or fall outside the plausible window are `AmbiguousDateFormat`.

use std::str::FromStr;

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::ParsingConfig;
use crate::error::{Error, Result};
use crate::models::{Direction, RawRow, RawTransactionRecord, SkipReason, SkippedRow};
use crate::profiles::{BankProfile, SignConvention};

/// Plausible-date window inputs
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// "Today" for range checks
    pub as_of: NaiveDate,
    /// First and last day covered by the statement, when known
    pub statement_period: Option<(NaiveDate, NaiveDate)>,
    pub grace_days: i64,
    pub max_history_days: i64,
}

impl ParseOptions {
    pub fn new(as_of: NaiveDate) -> Self {
        Self::from_config(&ParsingConfig::default(), as_of)
    }

    pub fn from_config(config: &ParsingConfig, as_of: NaiveDate) -> Self {
        Self {
            as_of,
            statement_period: None,
            grace_days: config.grace_days,
            max_history_days: config.max_history_days,
        }
    }

    pub fn with_period(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.statement_period = Some((start.min(end), start.max(end)));
        self
    }

    /// Inclusive range of dates accepted for a row, clamped to the calendar
    pub fn date_window(&self) -> (NaiveDate, NaiveDate) {
        match self.statement_period {
            Some((start, end)) => (
                shift_days(start, -self.grace_days.max(0)),
                shift_days(end, self.grace_days.max(0)),
            ),
            None => (
                shift_days(self.as_of, -self.max_history_days.max(0)),
                shift_days(self.as_of, self.grace_days.max(0)),
            ),
        }
    }
}

/// Saturates at `NaiveDate::MIN`/`MAX` instead of overflowing
fn shift_days(date: NaiveDate, days: i64) -> NaiveDate {
    let step = Days::new(days.unsigned_abs());
    if days >= 0 {
        date.checked_add_days(step).unwrap_or(NaiveDate::MAX)
    } else {
        date.checked_sub_days(step).unwrap_or(NaiveDate::MIN)
    }
}

/// Records and diagnostics for one statement
#[derive(Debug, Clone, Default)]
pub struct ParsedStatement {
    pub records: Vec<RawTransactionRecord>,
    pub skipped: Vec<SkippedRow>,
    pub rows_total: usize,
}

pub struct StatementParser<'a> {
    profile: &'a BankProfile,
    options: ParseOptions,
    batch_id: String,
}

impl<'a> StatementParser<'a> {
    pub fn new(profile: &'a BankProfile, batch_id: impl Into<String>, options: ParseOptions) -> Self {
        Self {
            profile,
            options,
            batch_id: batch_id.into(),
        }
    }

    /// Parse every row, collecting records and skipped-row diagnostics
    pub fn parse<I>(&self, rows: I) -> ParsedStatement
    where
        I: IntoIterator<Item = RawRow>,
    {
        let mut parsed = ParsedStatement::default();
        for row in rows {
            parsed.rows_total += 1;
            match self.parse_row(&row) {
                Ok(record) => parsed.records.push(record),
                Err(e) => {
                    if let Some(skipped) = skip_diagnostic(row.row_number, &e) {
                        parsed.skipped.push(skipped);
                    }
                }
            }
        }
        debug!(
            bank = %self.profile.code,
            parsed = parsed.records.len(),
            skipped = parsed.skipped.len(),
            "Parsed statement"
        );
        parsed
    }

    /// Parse a single row
    pub fn parse_row(&self, row: &RawRow) -> Result<RawTransactionRecord> {
        let n = row.row_number;
        let columns = &self.profile.columns;

        let required = self.profile.required_columns();
        if row.cells.len() < required {
            return Err(row_error(
                n,
                format!("expected at least {} columns, found {}", required, row.cells.len()),
            ));
        }

        let description = row
            .cell(columns.description)
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| row_error(n, "missing description"))?
            .to_string();

        let (amount, direction) = self.amount_and_direction(row)?;
        if amount.is_zero() {
            return Err(row_error(n, "zero amount"));
        }

        let date = self.parse_date(row)?;

        let reference = columns
            .reference
            .and_then(|i| row.cell(i))
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        Ok(RawTransactionRecord {
            batch_id: self.batch_id.clone(),
            row_number: n,
            date,
            amount,
            direction,
            description,
            reference,
        })
    }

    fn amount_and_direction(&self, row: &RawRow) -> Result<(Decimal, Direction)> {
        let n = row.row_number;
        let columns = &self.profile.columns;
        let cell = |index: Option<usize>| index.and_then(|i| row.cell(i)).unwrap_or("").trim();

        match self.profile.sign_convention {
            SignConvention::NegativeIsDebit | SignConvention::NegativeIsCredit => {
                let amount = parse_amount(cell(columns.amount), self.profile)
                    .map_err(|reason| row_error(n, reason))?;
                let direction = amount.marker.unwrap_or({
                    let negative_is_debit =
                        self.profile.sign_convention == SignConvention::NegativeIsDebit;
                    if amount.negative == negative_is_debit {
                        Direction::Debit
                    } else {
                        Direction::Credit
                    }
                });
                Ok((amount.magnitude, direction))
            }
            SignConvention::DebitCreditColumns => {
                let debit = optional_amount(cell(columns.debit), self.profile)
                    .map_err(|reason| row_error(n, reason))?;
                let credit = optional_amount(cell(columns.credit), self.profile)
                    .map_err(|reason| row_error(n, reason))?;
                match (debit, credit) {
                    (Some(d), None) => Ok((d.magnitude, d.signed_direction(Direction::Debit))),
                    (None, Some(c)) => Ok((c.magnitude, c.signed_direction(Direction::Credit))),
                    (Some(_), Some(_)) => Err(row_error(n, "both debit and credit amounts present")),
                    (None, None) => Err(row_error(n, "missing amount")),
                }
            }
            SignConvention::Indicator => {
                let amount = parse_amount(cell(columns.amount), self.profile)
                    .map_err(|reason| row_error(n, reason))?;
                let marker = cell(columns.direction);
                let direction = self
                    .profile
                    .direction_marker(marker)
                    .or(amount.marker)
                    .ok_or_else(|| {
                        row_error(n, format!("unknown direction marker '{}'", marker))
                    })?;
                Ok((amount.magnitude, direction))
            }
        }
    }

    fn parse_date(&self, row: &RawRow) -> Result<NaiveDate> {
        let value = row.cell(self.profile.columns.date).unwrap_or("").trim();
        let ambiguous = || Error::AmbiguousDateFormat {
            row: row.row_number,
            value: value.to_string(),
        };

        let date = self
            .profile
            .date_formats
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
            .ok_or_else(ambiguous)?;

        let (earliest, latest) = self.options.date_window();
        if date < earliest || date > latest {
            debug!(row = row.row_number, %date, %earliest, %latest, "Date outside plausible window");
            return Err(ambiguous());
        }
        Ok(date)
    }
}

fn row_error(row: usize, reason: impl Into<String>) -> Error {
    Error::RowParse {
        row,
        reason: reason.into(),
    }
}

/// Map a row-scoped error to its diagnostic; other errors are not row diagnostics
pub(crate) fn skip_diagnostic(row_number: usize, error: &Error) -> Option<SkippedRow> {
    let reason = match error {
        Error::RowParse { .. } => SkipReason::RowParseError,
        Error::AmbiguousDateFormat { .. } => SkipReason::AmbiguousDateFormat,
        _ => return None,
    };
    debug!(row = row_number, reason = %reason, error = %error, "Skipping row");
    Some(SkippedRow {
        row_number,
        reason,
        detail: error.to_string(),
    })
}

/// An amount cell taken apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ParsedAmount {
    magnitude: Decimal,
    negative: bool,
    /// Trailing DR/CR written next to the number
    marker: Option<Direction>,
}

impl ParsedAmount {
    /// Direction for a debit/credit column value; a negative value reverses it
    fn signed_direction(&self, column: Direction) -> Direction {
        match (self.marker, self.negative) {
            (Some(marker), _) => marker,
            (None, true) => column.flip(),
            (None, false) => column,
        }
    }
}

/// Empty, dash-only and zero cells in a debit/credit column mean "no amount"
fn optional_amount(text: &str, profile: &BankProfile) -> std::result::Result<Option<ParsedAmount>, String> {
    if text.is_empty() || text.chars().all(|c| c == '-' || c.is_whitespace()) {
        return Ok(None);
    }
    let amount = parse_amount(text, profile)?;
    Ok((!amount.magnitude.is_zero()).then_some(amount))
}

/// Parse an amount honoring the profile's separators
///
/// Accepts currency symbols or codes, a leading or trailing sign, parentheses
/// for negatives, and a trailing DR/CR mark.
fn parse_amount(text: &str, profile: &BankProfile) -> std::result::Result<ParsedAmount, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("missing amount".into());
    }

    let first_digit = text.find(|c: char| c.is_ascii_digit());
    let last_digit = text.rfind(|c: char| c.is_ascii_digit());
    let (Some(start), Some(end)) = (first_digit, last_digit) else {
        return Err(format!("non-numeric amount '{}'", text));
    };

    let prefix = &text[..start];
    let number = &text[start..=end];
    let suffix = text[end + 1..].trim();

    // A decimal separator written without a leading zero (".50")
    let (prefix, number) = match prefix.strip_suffix(profile.decimal_separator) {
        Some(rest) if !rest.ends_with(|c: char| c.is_alphabetic()) => {
            (rest, format!("0{}{}", profile.decimal_separator, number))
        }
        _ => (prefix, number.to_string()),
    };

    let suffix_upper = suffix.to_ascii_uppercase();
    let (marker, suffix_rest) = if let Some(rest) = suffix_upper.strip_suffix("DR") {
        (Some(Direction::Debit), rest.trim().to_string())
    } else if let Some(rest) = suffix_upper.strip_suffix("CR") {
        (Some(Direction::Credit), rest.trim().to_string())
    } else {
        (None, suffix_upper)
    };

    if prefix.chars().any(|c| c.is_ascii_digit()) || suffix_rest.chars().any(|c| c.is_ascii_digit()) {
        return Err(format!("non-numeric amount '{}'", text));
    }

    let parenthesized = prefix.contains('(') && suffix_rest.contains(')');
    let negative = parenthesized || prefix.contains('-') || suffix_rest.contains('-');

    let mut normalized = String::with_capacity(number.len());
    for c in number.chars() {
        if c.is_ascii_digit() {
            normalized.push(c);
        } else if c == profile.decimal_separator {
            normalized.push('.');
        } else if Some(c) == profile.thousands_separator || c == ' ' || c == '\'' {
            continue;
        } else {
            return Err(format!("non-numeric amount '{}'", text));
        }
    }

    let magnitude = Decimal::from_str(&normalized)
        .map_err(|_| format!("non-numeric amount '{}'", text))?;

    Ok(ParsedAmount {
        magnitude,
        negative,
        marker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::BankProfileRegistry;
    use std::sync::Arc;

    fn profile(code: &str) -> Arc<BankProfile> {
        BankProfileRegistry::embedded().unwrap().resolve(code).unwrap()
    }

    fn row(n: usize, cells: &[&str]) -> RawRow {
        RawRow::new(n, cells.iter().map(|c| c.to_string()).collect())
    }

    fn options() -> ParseOptions {
        ParseOptions::new(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_scenario_indicator_row() {
        let p = profile("generic_dr_cr");
        let parser = StatementParser::new(&p, "batch1", options());
        let record = parser
            .parse_row(&row(1, &["2024-05-01", "UPI/RRN123456789/JohnStore", "450.00", "DR"]))
            .unwrap();

        assert_eq!(record.amount, dec("450.00"));
        assert_eq!(record.direction, Direction::Debit);
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(record.description, "UPI/RRN123456789/JohnStore");
        assert_eq!(record.batch_id, "batch1");
    }

    #[test]
    fn test_amount_formats() {
        let p = profile("generic");
        let parse = |s: &str| parse_amount(s, &p).unwrap();

        assert_eq!(parse("$1,234.56").magnitude, dec("1234.56"));
        assert!(parse("-123.45").negative);
        assert!(parse("(100.00)").negative);
        assert!(parse("100.00-").negative);
        assert_eq!(parse("Rs. 450.00").magnitude, dec("450.00"));
        assert!(!parse("Rs. 450.00").negative);
        assert_eq!(parse("₹ 1,00,000.00").magnitude, dec("100000.00"));
        assert_eq!(parse("450.00 Dr").marker, Some(Direction::Debit));
        assert_eq!(parse("12.00CR").marker, Some(Direction::Credit));
        assert_eq!(parse(".50").magnitude, dec("0.50"));
        assert!(parse_amount("abc", &p).is_err());
        assert!(parse_amount("12abc34", &p).is_err());
        assert!(parse_amount("", &p).is_err());
    }

    #[test]
    fn test_comma_decimal_amounts() {
        let p = profile("eu_comma");
        let amount = parse_amount("-1.234,56 €", &p).unwrap();
        assert_eq!(amount.magnitude, dec("1234.56"));
        assert!(amount.negative);
    }

    #[test]
    fn test_negative_is_debit_convention() {
        let p = profile("generic");
        let parser = StatementParser::new(&p, "b", options());
        let debit = parser.parse_row(&row(1, &["2024-05-01", "Coffee", "-4.50"])).unwrap();
        let credit = parser.parse_row(&row(2, &["2024-05-02", "Refund", "4.50"])).unwrap();
        assert_eq!(debit.direction, Direction::Debit);
        assert_eq!(debit.amount, dec("4.50"));
        assert_eq!(credit.direction, Direction::Credit);
    }

    #[test]
    fn test_debit_credit_columns() {
        let p = profile("hdfc");
        let parser = StatementParser::new(&p, "b", options());
        let debit = parser
            .parse_row(&row(1, &["01/05/24", "UPI-SWIGGY", "0000412233", "01/05/24", "350.00", "", "9,650.00"]))
            .unwrap();
        let credit = parser
            .parse_row(&row(2, &["02/05/24", "NEFT CR-ACME", "N1234", "02/05/24", "0.00", "50,000.00", "59,650.00"]))
            .unwrap();

        assert_eq!(debit.direction, Direction::Debit);
        assert_eq!(debit.reference.as_deref(), Some("0000412233"));
        assert_eq!(credit.direction, Direction::Credit);
        assert_eq!(credit.amount, dec("50000.00"));

        let both = parser.parse_row(&row(3, &["02/05/24", "X", "", "", "1.00", "2.00", ""]));
        assert!(matches!(both, Err(Error::RowParse { row: 3, .. })));
    }

    #[test]
    fn test_structural_errors() {
        let p = profile("generic");
        let parser = StatementParser::new(&p, "b", options());

        let short = parser.parse_row(&row(1, &["2024-05-01", "Coffee"]));
        assert!(matches!(short, Err(Error::RowParse { row: 1, .. })));

        let no_desc = parser.parse_row(&row(2, &["2024-05-01", "  ", "-4.50"]));
        assert!(matches!(no_desc, Err(Error::RowParse { row: 2, .. })));

        let bad_amount = parser.parse_row(&row(3, &["2024-05-01", "Coffee", "four"]));
        assert!(matches!(bad_amount, Err(Error::RowParse { row: 3, .. })));

        let zero = parser.parse_row(&row(4, &["2024-05-01", "Coffee", "0.00"]));
        assert!(matches!(zero, Err(Error::RowParse { row: 4, .. })));
    }

    #[test]
    fn test_unparsable_and_implausible_dates() {
        let p = profile("generic");
        let parser = StatementParser::new(&p, "b", options());

        let garbled = parser.parse_row(&row(1, &["2024-13-45", "Coffee", "-4.50"]));
        assert!(matches!(garbled, Err(Error::AmbiguousDateFormat { row: 1, .. })));

        let future = parser.parse_row(&row(2, &["2030-01-01", "Coffee", "-4.50"]));
        assert!(matches!(future, Err(Error::AmbiguousDateFormat { row: 2, .. })));

        let ancient = parser.parse_row(&row(3, &["1999-01-01", "Coffee", "-4.50"]));
        assert!(matches!(ancient, Err(Error::AmbiguousDateFormat { .. })));
    }

    #[test]
    fn test_statement_period_window() {
        let p = profile("generic");
        let opts = options().with_period(
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        );
        let parser = StatementParser::new(&p, "b", opts);

        assert!(parser.parse_row(&row(1, &["2024-04-26", "In grace", "-1"])).is_ok());
        let outside = parser.parse_row(&row(2, &["2024-03-01", "Too early", "-1"]));
        assert!(matches!(outside, Err(Error::AmbiguousDateFormat { .. })));
    }

    #[test]
    fn test_huge_window_saturates() {
        let as_of = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let mut opts = ParseOptions::new(as_of);
        opts.max_history_days = i64::MAX;
        opts.grace_days = i64::MAX;
        assert_eq!(opts.date_window(), (NaiveDate::MIN, NaiveDate::MAX));

        opts.grace_days = -5;
        let (_, latest) = opts.date_window();
        assert_eq!(latest, as_of);

        let p = profile("generic");
        let parser = StatementParser::new(&p, "b", opts);
        assert!(parser.parse_row(&row(1, &["1901-01-01", "Old", "-1"])).is_ok());
    }

    #[test]
    fn test_parse_counts_skips_by_reason() {
        let p = profile("generic");
        let parser = StatementParser::new(&p, "b", options());
        let rows: Vec<RawRow> = (1..=100)
            .map(|i| {
                let date = if i % 20 == 0 { "31/31/2024".to_string() } else { "2024-05-01".to_string() };
                RawRow::new(i, vec![date, format!("Item {}", i), format!("-{}.00", i)])
            })
            .collect();

        let parsed = parser.parse(rows);
        assert_eq!(parsed.rows_total, 100);
        assert_eq!(parsed.records.len(), 95);
        assert_eq!(parsed.skipped.len(), 5);
        assert!(parsed
            .skipped
            .iter()
            .all(|s| s.reason == SkipReason::AmbiguousDateFormat));
    }
}
