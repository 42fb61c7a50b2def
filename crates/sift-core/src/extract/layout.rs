//! Column recovery for text-layout sources (PDF text, plain-text email bodies)
//!
//! A dated line starts a new row. Its cells come from splitting on runs of
//! two or more spaces; when that does not produce the profile's column
//! count, a regex with named groups is tried instead. Undated lines continue
//! the previous row's description.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};

use crate::error::Result;
use crate::models::{Direction, RawRow};
use crate::profiles::{BankProfile, SignConvention};

fn column_gap_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}|\t").expect("column gap regex"))
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\S+").expect("token regex"))
}

/// Tail of a dated line: description, amount, optional DR/CR marker
fn row_tail_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<description>.+?)\s+(?P<amount>\(?[-+]?\D{0,3}\d[\d.,]*\)?-?)(?:\s+(?P<direction>(?i:dr|cr)))?$",
        )
        .expect("row tail regex")
    })
}

/// Same as `row_tail_re` followed by a running balance
fn row_tail_with_balance_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<description>.+?)\s+(?P<amount>\(?[-+]?\D{0,3}\d[\d.,]*\)?-?)(?:\s+(?P<direction>(?i:dr|cr)))?\s+(?P<balance>-?[\d.,]+(?:\s*(?i:dr|cr))?)$",
        )
        .expect("row tail with balance regex")
    })
}

/// Byte length of the date at the start of `line`, if it starts with one
///
/// Tries the longest prefix of up to three whitespace-separated tokens first
/// so formats like `%d %b %Y` win over shorter accidental matches.
pub(crate) fn leading_date(line: &str, profile: &BankProfile) -> Option<(NaiveDate, usize)> {
    let ends: Vec<usize> = token_re().find_iter(line).take(3).map(|m| m.end()).collect();

    ends.iter().rev().find_map(|&end| {
        let candidate = &line[..end];
        profile
            .date_formats
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(candidate.trim(), fmt).ok())
            .map(|date| (date, end))
    })
}

/// Split one dated line into cells positioned per the profile's column map
pub(crate) fn split_layout_line(line: &str, profile: &BankProfile) -> Vec<String> {
    let cells: Vec<String> = column_gap_re()
        .split(line.trim())
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    if layout_split_fits(cells.len(), profile) {
        return cells;
    }

    if let Some(caps) = profile
        .pdf_row_pattern
        .as_ref()
        .and_then(|re| re.captures(line.trim()))
    {
        return place_captures(&caps, profile);
    }

    if let Some(placed) = builtin_split(line, profile) {
        return placed;
    }

    tracing::debug!(cells = cells.len(), "Layout line matched no column pattern");
    cells
}

fn layout_split_fits(count: usize, profile: &BankProfile) -> bool {
    if count == profile.column_count() {
        return true;
    }
    // Optional columns sitting after every required one may be absent
    let required = profile.required_columns();
    let c = &profile.columns;
    let optional_trailing = [c.reference, c.balance]
        .into_iter()
        .flatten()
        .all(|i| i >= required);
    count == required && optional_trailing
}

fn builtin_split(line: &str, profile: &BankProfile) -> Option<Vec<String>> {
    let line = line.trim();
    let (_, date_end) = leading_date(line, profile)?;
    let date = line[..date_end].trim();
    let tail = line[date_end..].trim();

    let caps = if profile.columns.balance.is_some() {
        row_tail_with_balance_re()
            .captures(tail)
            .or_else(|| row_tail_re().captures(tail))
    } else {
        row_tail_re().captures(tail)
    }?;

    let mut cells = place_captures(&caps, profile);
    cells[profile.columns.date] = date.to_string();
    Some(cells)
}

/// Put named captures at the profile's column positions
fn place_captures(caps: &Captures<'_>, profile: &BankProfile) -> Vec<String> {
    let c = &profile.columns;
    let mut cells = vec![String::new(); profile.column_count()];
    let group = |name: &str| caps.name(name).map(|m| m.as_str().trim().to_string());

    let mut put = |index: Option<usize>, value: Option<String>| {
        if let (Some(i), Some(v)) = (index, value) {
            cells[i] = v;
        }
    };

    put(Some(c.date), group("date"));
    put(Some(c.description), group("description"));
    put(c.reference, group("reference"));
    put(c.balance, group("balance"));
    put(c.direction, group("direction"));
    put(c.debit, group("debit"));
    put(c.credit, group("credit"));

    if c.amount.is_some() {
        put(c.amount, group("amount"));
    } else if profile.sign_convention == SignConvention::DebitCreditColumns {
        // A single amount only lands in a debit/credit column when a marker says which
        let marker = group("direction").and_then(|d| profile.direction_marker(&d));
        match marker {
            Some(Direction::Debit) => put(c.debit, group("amount")),
            Some(Direction::Credit) => put(c.credit, group("amount")),
            None => {}
        }
    }

    cells
}

/// Turns single-cell text lines into split rows, folding continuation lines
/// into the previous row's description
pub(crate) struct LayoutRows<I> {
    lines: I,
    profile: BankProfile,
    pending: Option<RawRow>,
}

impl<I> LayoutRows<I> {
    pub(crate) fn new(lines: I, profile: BankProfile) -> Self {
        Self {
            lines,
            profile,
            pending: None,
        }
    }
}

impl<I> Iterator for LayoutRows<I>
where
    I: Iterator<Item = Result<RawRow>>,
{
    type Item = Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line_row = match self.lines.next() {
                None => return self.pending.take().map(Ok),
                Some(Err(e)) => return Some(Err(e)),
                Some(Ok(row)) => row,
            };
            let line = line_row.joined();
            let line = line.trim();

            if leading_date(line, &self.profile).is_some() {
                let row = RawRow::new(line_row.row_number, split_layout_line(line, &self.profile));
                if let Some(previous) = self.pending.replace(row) {
                    return Some(Ok(previous));
                }
                continue;
            }

            match self.pending.as_mut() {
                Some(previous) => {
                    if let Some(desc) = previous.cells.get_mut(self.profile.columns.description) {
                        if !desc.is_empty() {
                            desc.push(' ');
                        }
                        desc.push_str(line);
                    }
                }
                None => tracing::debug!(row = line_row.row_number, "Skipping undated preamble line"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::BankProfileRegistry;

    fn profile(code: &str) -> BankProfile {
        BankProfileRegistry::embedded()
            .unwrap()
            .resolve(code)
            .unwrap()
            .as_ref()
            .clone()
    }

    fn lines(text: &str) -> Vec<Result<RawRow>> {
        text.lines()
            .enumerate()
            .map(|(i, l)| Ok(RawRow::new(i + 1, vec![l.to_string()])))
            .collect()
    }

    #[test]
    fn test_leading_date_multi_token() {
        let sbi = profile("sbi");
        let (date, end) = leading_date("01 May 2024  TO TRANSFER  500.00", &sbi).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(end, 11);
        assert!(leading_date("TO TRANSFER 500.00", &sbi).is_none());
    }

    #[test]
    fn test_split_on_wide_gaps() {
        let generic = profile("generic");
        let cells = split_layout_line("2024-05-01   Coffee Shop   -4.50", &generic);
        assert_eq!(cells, vec!["2024-05-01", "Coffee Shop", "-4.50"]);
    }

    #[test]
    fn test_builtin_fallback_with_marker() {
        let p = profile("generic_dr_cr");
        let cells = split_layout_line("2024-05-01 UPI/RRN123456789/JohnStore 450.00 DR", &p);
        assert_eq!(
            cells,
            vec!["2024-05-01", "UPI/RRN123456789/JohnStore", "450.00", "DR"]
        );
    }

    #[test]
    fn test_profile_pattern_fallback() {
        let axis = profile("axis");
        let cells = split_layout_line("02-05-2024 POS AMAZON RETAIL 1,299.00 DR 10,000.00", &axis);
        assert_eq!(cells[0], "02-05-2024");
        assert_eq!(cells[1], "POS AMAZON RETAIL");
        assert_eq!(cells[2], "1,299.00");
        assert_eq!(cells[3], "DR");
    }

    #[test]
    fn test_debit_credit_placement_by_marker() {
        let hdfc = profile("hdfc");
        let cells = split_layout_line("01/05/24 SALARY MAY 50,000.00 CR 75,000.00", &hdfc);
        assert_eq!(cells[0], "01/05/24");
        assert_eq!(cells[1], "SALARY MAY");
        assert_eq!(cells[5], "50,000.00");
        assert_eq!(cells[4], "");
    }

    #[test]
    fn test_continuation_lines_fold_into_description() {
        let generic = profile("generic");
        let text = "Opening balance\n\
                    2024-05-01   NEFT TRANSFER   -100.00\n\
                    ACME CORP PAYROLL\n\
                    2024-05-02   Coffee   -4.50";
        let rows: Vec<RawRow> = LayoutRows::new(lines(text).into_iter(), generic)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_number, 2);
        assert_eq!(rows[0].cells[1], "NEFT TRANSFER ACME CORP PAYROLL");
        assert_eq!(rows[1].cells[1], "Coffee");
    }
}
