//! Format extraction: statement bytes in, raw rows of cell text out
//!
//! Readers know nothing about amounts or dates. They only decide which rows
//! belong to the transaction block (per the bank profile's skip rules) and
//! how to split each row into cells.

mod email;
mod layout;
mod pdf;
mod tabular;

use std::collections::VecDeque;

use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::models::RawRow;
use crate::profiles::BankProfile;

/// Concrete reader chosen for a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementFormat {
    /// Delimited text export (CSV/TSV)
    Spreadsheet,
    Pdf,
    /// RFC 5322 message, e.g. a forwarded bank alert
    Email,
}

impl StatementFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spreadsheet => "spreadsheet",
            Self::Pdf => "pdf",
            Self::Email => "email",
        }
    }
}

impl std::fmt::Display for StatementFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller's claim about the statement format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatHint {
    #[default]
    Auto,
    Spreadsheet,
    Pdf,
    Email,
}

impl FormatHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Spreadsheet => "spreadsheet",
            Self::Pdf => "pdf",
            Self::Email => "email",
        }
    }

    fn expected(&self) -> Option<StatementFormat> {
        match self {
            Self::Auto => None,
            Self::Spreadsheet => Some(StatementFormat::Spreadsheet),
            Self::Pdf => Some(StatementFormat::Pdf),
            Self::Email => Some(StatementFormat::Email),
        }
    }
}

impl std::str::FromStr for FormatHint {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "spreadsheet" | "csv" | "tsv" => Ok(Self::Spreadsheet),
            "pdf" => Ok(Self::Pdf),
            "email" | "eml" => Ok(Self::Email),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

impl std::fmt::Display for FormatHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lazy, single-pass stream of extracted rows
pub struct RowStream {
    format: StatementFormat,
    inner: Box<dyn Iterator<Item = Result<RawRow>> + Send>,
}

impl RowStream {
    pub(crate) fn new(
        format: StatementFormat,
        inner: impl Iterator<Item = Result<RawRow>> + Send + 'static,
    ) -> Self {
        Self {
            format,
            inner: Box::new(inner),
        }
    }

    pub fn format(&self) -> StatementFormat {
        self.format
    }
}

impl Iterator for RowStream {
    type Item = Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl std::fmt::Debug for RowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Open a statement and stream its transaction rows
pub fn extract(bytes: &[u8], hint: FormatHint, profile: &BankProfile) -> Result<RowStream> {
    let detected = sniff(bytes, profile).ok_or_else(|| {
        if looks_like_workbook(bytes) {
            Error::FormatUnsupported(
                "Excel workbooks (.xlsx/.xls) are not read; export the sheet to CSV".into(),
            )
        } else {
            Error::FormatUnsupported("byte signature matches no known statement format".into())
        }
    })?;

    if let Some(expected) = hint.expected() {
        if expected != detected {
            return Err(Error::FormatUnsupported(format!(
                "declared {} but content looks like {}",
                expected, detected
            )));
        }
    }

    tracing::debug!(format = %detected, bank = %profile.code, "Extracting statement");

    match detected {
        StatementFormat::Spreadsheet => tabular::extract(bytes, profile),
        StatementFormat::Pdf => pdf::extract(bytes, profile),
        StatementFormat::Email => email::extract(bytes, profile),
    }
}

/// Header names that mark the start of an RFC 5322 message
const EMAIL_MARKER_HEADERS: [&str; 3] = ["mime-version", "content-type", "from"];

/// Guess the statement format from its byte signature
pub fn sniff(bytes: &[u8], profile: &BankProfile) -> Option<StatementFormat> {
    let trimmed = trim_leading_whitespace(bytes);
    if trimmed.starts_with(b"%PDF-") {
        return Some(StatementFormat::Pdf);
    }

    let head = &bytes[..bytes.len().min(8192)];
    if looks_binary(head) {
        return None;
    }

    if looks_like_email(&String::from_utf8_lossy(head)) {
        return Some(StatementFormat::Email);
    }

    profile
        .encoding
        .decode(bytes)
        .filter(|text| !text.trim().is_empty())
        .map(|_| StatementFormat::Spreadsheet)
}

fn trim_leading_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

/// Zip container (xlsx) or OLE compound document (xls)
fn looks_like_workbook(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0])
}

fn looks_binary(head: &[u8]) -> bool {
    head.iter()
        .any(|&b| b == 0 || (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c)))
}

/// First line is a `Name: value` header and the header block names a mail header
fn looks_like_email(head: &str) -> bool {
    let mut lines = head.lines().skip_while(|l| l.trim().is_empty());
    let Some(first) = lines.next() else {
        return false;
    };
    if header_name(first).is_none() {
        return false;
    }

    std::iter::once(first)
        .chain(lines.take_while(|l| !l.trim().is_empty()))
        .filter_map(header_name)
        .any(|name| EMAIL_MARKER_HEADERS.contains(&name.to_ascii_lowercase().as_str()))
}

fn header_name(line: &str) -> Option<&str> {
    let (name, _) = line.split_once(':')?;
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    valid.then_some(name)
}

/// Applies a profile's skip rules to a row iterator:
/// leading rows, everything through the header row, repeated header rows,
/// and everything from the first footer row on.
///
/// A row whose date cell reads as a date is always a transaction row, never
/// a header or footer.
pub(crate) struct BlockFilter<I> {
    rows: I,
    skip_rows: usize,
    header_marker: Option<String>,
    footer_markers: Vec<String>,
    date_column: usize,
    date_formats: Vec<String>,
    /// Rows held while looking for the header
    pending: VecDeque<Result<RawRow>>,
    state: BlockState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockState {
    Leading,
    SeekingHeader,
    Body,
    Done,
}

/// Rows scanned for the header marker before assuming the file has none
const HEADER_SCAN_LIMIT: usize = 50;

/// Non-empty fields of a cell, split at tabs and runs of two or more spaces
fn layout_fields(cell: &str) -> impl Iterator<Item = &str> {
    cell.split('\t')
        .flat_map(|part| part.split("  "))
        .map(str::trim)
        .filter(|field| !field.is_empty())
}

impl<I> BlockFilter<I>
where
    I: Iterator<Item = Result<RawRow>>,
{
    pub(crate) fn new(rows: I, profile: &BankProfile) -> Self {
        Self {
            rows,
            skip_rows: profile.skip_rows,
            header_marker: profile.header_marker.as_ref().map(|m| m.to_lowercase()),
            footer_markers: profile
                .footer_markers
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
            date_column: profile.columns.date,
            date_formats: profile.date_formats.clone(),
            pending: VecDeque::new(),
            state: BlockState::Leading,
        }
    }

    /// Some field equals or starts with the marker
    fn is_header(&self, row: &RawRow) -> bool {
        let Some(marker) = &self.header_marker else {
            return false;
        };
        if self.has_date(row) {
            return false;
        }
        row.cells
            .iter()
            .flat_map(|cell| layout_fields(cell))
            .any(|field| field.to_lowercase().starts_with(marker.as_str()))
    }

    fn is_footer(&self, row: &RawRow) -> bool {
        if self.footer_markers.is_empty() || self.has_date(row) {
            return false;
        }
        let text = row.joined().to_lowercase();
        self.footer_markers.iter().any(|m| text.contains(m))
    }

    /// Date cell parses under one of the profile's formats. Unsplit text
    /// lines are checked on their leading words.
    fn has_date(&self, row: &RawRow) -> bool {
        match row.cells.as_slice() {
            [line] => {
                let words: Vec<&str> = line.split_whitespace().take(3).collect();
                (1..=words.len()).any(|n| self.parses_as_date(&words[..n].join(" ")))
            }
            cells => cells
                .get(self.date_column)
                .is_some_and(|cell| self.parses_as_date(cell.trim())),
        }
    }

    fn parses_as_date(&self, value: &str) -> bool {
        self.date_formats
            .iter()
            .any(|fmt| NaiveDate::parse_from_str(value, fmt).is_ok())
    }

    /// Pull rows until the header is found or the scan limit is hit
    fn seek_header(&mut self) {
        while self.pending.len() < HEADER_SCAN_LIMIT {
            match self.rows.next() {
                Some(Ok(row)) if self.is_header(&row) => {
                    self.pending.clear();
                    self.state = BlockState::Body;
                    return;
                }
                Some(item) => self.pending.push_back(item),
                None => break,
            }
        }
        tracing::debug!("Header marker not found; keeping leading rows");
        self.state = BlockState::Body;
    }

    fn next_body_row(&mut self) -> Option<Result<RawRow>> {
        loop {
            let item = match self.pending.pop_front() {
                Some(item) => item,
                None => self.rows.next()?,
            };
            let row = match item {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };
            if row.is_blank() || self.is_header(&row) {
                continue;
            }
            if self.is_footer(&row) {
                self.state = BlockState::Done;
                self.pending.clear();
                return None;
            }
            return Some(Ok(row));
        }
    }
}

impl<I> Iterator for BlockFilter<I>
where
    I: Iterator<Item = Result<RawRow>>,
{
    type Item = Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                BlockState::Leading => {
                    for _ in 0..self.skip_rows {
                        if self.rows.next().is_none() {
                            break;
                        }
                    }
                    self.state = if self.header_marker.is_some() {
                        BlockState::SeekingHeader
                    } else {
                        BlockState::Body
                    };
                }
                BlockState::SeekingHeader => self.seek_header(),
                BlockState::Body => return self.next_body_row(),
                BlockState::Done => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::test_profile;

    fn profile(extra: &str) -> BankProfile {
        test_profile(&format!(
            r#"
            [[bank]]
            code = "t"
            date_formats = ["%Y-%m-%d"]
            sign_convention = "negative_is_debit"
            {}
            [bank.columns]
            date = 0
            description = 1
            amount = 2
            "#,
            extra
        ))
    }

    fn rows(lines: &[&str]) -> Vec<Result<RawRow>> {
        lines
            .iter()
            .enumerate()
            .map(|(i, l)| Ok(RawRow::new(i + 1, vec![l.to_string()])))
            .collect()
    }

    fn filtered(profile: &BankProfile, lines: &[&str]) -> Vec<usize> {
        BlockFilter::new(rows(lines).into_iter(), profile)
            .map(|r| r.unwrap().row_number)
            .collect()
    }

    #[test]
    fn test_sniff_pdf() {
        let p = profile("");
        assert_eq!(sniff(b"%PDF-1.7\n...", &p), Some(StatementFormat::Pdf));
    }

    #[test]
    fn test_sniff_email() {
        let p = profile("");
        let eml = b"From: alerts@bank.example\r\nMIME-Version: 1.0\r\nContent-Type: text/plain\r\n\r\nbody";
        assert_eq!(sniff(eml, &p), Some(StatementFormat::Email));
    }

    #[test]
    fn test_sniff_csv_with_colon_is_not_email() {
        let p = profile("");
        let csv = b"2024-05-01,Time: 10:00 coffee,-4.50\n";
        assert_eq!(sniff(csv, &p), Some(StatementFormat::Spreadsheet));
    }

    #[test]
    fn test_sniff_binary_is_unsupported() {
        let p = profile("");
        assert_eq!(sniff(b"PK\x03\x04\x00\x00binary", &p), None);
    }

    #[test]
    fn test_workbook_error_suggests_csv_export() {
        let p = profile("");
        let workbooks: [&[u8]; 2] = [
            b"PK\x03\x04\x14\x00\x06\x00",
            &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1],
        ];
        for bytes in workbooks {
            let err = extract(bytes, FormatHint::Auto, &p).unwrap_err();
            assert!(matches!(&err, Error::FormatUnsupported(msg) if msg.contains("CSV")));
        }
        let err = extract(&[0u8, 1, 2, 3], FormatHint::Auto, &p).unwrap_err();
        assert!(!err.to_string().contains("CSV"));
    }

    #[test]
    fn test_hint_must_agree() {
        let p = profile("");
        let err = extract(b"2024-05-01,Coffee,-4.50\n", FormatHint::Pdf, &p).unwrap_err();
        assert!(matches!(err, Error::FormatUnsupported(_)));
    }

    #[test]
    fn test_format_hint_parsing() {
        assert_eq!("CSV".parse::<FormatHint>().unwrap(), FormatHint::Spreadsheet);
        assert_eq!("eml".parse::<FormatHint>().unwrap(), FormatHint::Email);
        assert!("xlsx".parse::<FormatHint>().is_err());
    }

    #[test]
    fn test_block_filter_header_and_footer() {
        let p = profile(
            r#"header_marker = "Txn Date"
            footer_markers = ["Closing Balance"]"#,
        );
        let kept = filtered(
            &p,
            &[
                "Account Statement",
                "Txn Date Description Amount",
                "2024-05-01 A 1",
                "",
                "2024-05-02 B 2",
                "Closing Balance 100",
                "2024-05-03 C 3",
            ],
        );
        assert_eq!(kept, vec![3, 5]);
    }

    #[test]
    fn test_block_filter_missing_header_keeps_rows() {
        let p = profile(r#"header_marker = "Narration""#);
        let kept = filtered(&p, &["2024-05-01 A 1", "2024-05-02 B 2"]);
        assert_eq!(kept, vec![1, 2]);
    }

    #[test]
    fn test_block_filter_skip_rows_and_repeated_header() {
        let p = profile(
            r#"skip_rows = 1
            header_marker = "date""#,
        );
        let kept = filtered(
            &p,
            &["Bank Ltd", "date,desc,amt", "r1", "date,desc,amt", "r2"],
        );
        assert_eq!(kept, vec![3, 5]);
    }

    fn csv_rows(lines: &[&[&str]]) -> Vec<Result<RawRow>> {
        lines
            .iter()
            .enumerate()
            .map(|(i, cells)| Ok(RawRow::new(i + 1, cells.iter().map(|c| c.to_string()).collect())))
            .collect()
    }

    #[test]
    fn test_marker_inside_description_is_not_a_header() {
        let p = profile(r#"header_marker = "date""#);
        let rows = csv_rows(&[
            &["2024-05-01", "Coffee", "-3.50"],
            &["2024-05-02", "NACH MANDATE ACME INSURANCE", "-1200"],
            &["2024-05-03", "Tea", "-2.00"],
            &["2024-05-04", "ECS UPDATE FEE", "-50"],
        ]);
        let kept: Vec<usize> = BlockFilter::new(rows.into_iter(), &p)
            .map(|r| r.unwrap().row_number)
            .collect();
        assert_eq!(kept, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_header_cell_matched_by_prefix() {
        let p = profile(r#"header_marker = "date""#);
        let rows = csv_rows(&[
            &["Statement for ACME UPDATE account"],
            &["Posting Info", "Memo", "Amount"],
            &["Date (YYYY-MM-DD)", "Description", "Amount"],
            &["2024-05-01", "Coffee", "-3.50"],
            &["2024-05-02", "Date night dinner", "-40"],
        ]);
        let kept: Vec<usize> = BlockFilter::new(rows.into_iter(), &p)
            .map(|r| r.unwrap().row_number)
            .collect();
        assert_eq!(kept, vec![4, 5]);
    }

    #[test]
    fn test_dated_row_mentioning_footer_is_kept() {
        let p = profile(
            r#"header_marker = "date"
            footer_markers = ["Closing Balance"]"#,
        );
        let rows = csv_rows(&[
            &["Date", "Description", "Amount"],
            &["2024-05-01", "CLOSING BALANCE TRANSFER", "-10"],
            &["Closing Balance", "", "90"],
            &["2024-05-02", "After footer", "-1"],
        ]);
        let kept: Vec<usize> = BlockFilter::new(rows.into_iter(), &p)
            .map(|r| r.unwrap().row_number)
            .collect();
        assert_eq!(kept, vec![2]);
    }
}
