//! Forwarded bank emails (MIME)
//!
//! HTML bodies are read table by table; plain-text bodies are treated like a
//! PDF text layer.

use std::sync::OnceLock;

use mailparse::{parse_mail, ParsedMail};
use scraper::{ElementRef, Html, Selector};

use super::layout::LayoutRows;
use super::pdf::text_lines;
use super::{BlockFilter, RowStream, StatementFormat};
use crate::error::{Error, Result};
use crate::models::RawRow;
use crate::profiles::BankProfile;

fn tr_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("tr").expect("invalid tr selector"))
}

fn table_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("table").expect("invalid table selector"))
}

pub(super) fn extract(bytes: &[u8], profile: &BankProfile) -> Result<RowStream> {
    let mail = parse_mail(bytes)?;

    if let Some(html) = find_body(&mail, "text/html") {
        let rows = table_rows(&html);
        if !rows.is_empty() {
            tracing::debug!(rows = rows.len(), "Reading transactions from HTML tables");
            let rows: Vec<Result<RawRow>> = rows
                .into_iter()
                .enumerate()
                .map(|(i, cells)| Ok(RawRow::new(i + 1, cells)))
                .collect();
            return Ok(RowStream::new(
                StatementFormat::Email,
                BlockFilter::new(rows.into_iter(), profile),
            ));
        }
    }

    let text = find_body(&mail, "text/plain")
        .or_else(|| find_body(&mail, "text/html").map(|html| html_text(&html)))
        .ok_or_else(|| Error::FormatUnsupported("email has no readable text body".into()))?;

    let block = BlockFilter::new(text_lines(&text).into_iter(), profile);
    Ok(RowStream::new(
        StatementFormat::Email,
        LayoutRows::new(block, profile.clone()),
    ))
}

/// Depth-first search for the first part with the given MIME type
fn find_body(mail: &ParsedMail<'_>, mimetype: &str) -> Option<String> {
    if mail.ctype.mimetype.eq_ignore_ascii_case(mimetype) {
        if let Ok(body) = mail.get_body() {
            return Some(body);
        }
    }
    mail.subparts.iter().find_map(|part| find_body(part, mimetype))
}

/// Rows of `td`/`th` text from innermost tables
fn table_rows(html: &str) -> Vec<Vec<String>> {
    let doc = Html::parse_document(html);
    doc.select(tr_selector())
        // Layout rows wrapping a nested table would repeat its text
        .filter(|tr| tr.select(table_selector()).next().is_none())
        .map(|tr| {
            tr.children()
                .filter_map(ElementRef::wrap)
                .filter(|cell| {
                    let name = cell.value().name();
                    name.eq_ignore_ascii_case("td") || name.eq_ignore_ascii_case("th")
                })
                .map(|cell| collapse_whitespace(&cell.text().collect::<Vec<_>>().join(" ")))
                .collect::<Vec<_>>()
        })
        .filter(|row| row.iter().any(|c| !c.is_empty()))
        .collect()
}

/// Visible text of an HTML body, one line per text node
fn html_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    doc.root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use crate::extract::{extract, FormatHint, StatementFormat};
    use crate::models::RawRow;
    use crate::profiles::BankProfileRegistry;

    fn rows(bytes: &[u8], code: &str) -> Vec<RawRow> {
        let registry = BankProfileRegistry::embedded().unwrap();
        let profile = registry.resolve(code).unwrap();
        let stream = extract(bytes, FormatHint::Email, &profile).unwrap();
        assert_eq!(stream.format(), StatementFormat::Email);
        stream.collect::<Result<_, _>>().unwrap()
    }

    #[test]
    fn test_html_table_email() {
        let eml = "From: alerts@axisbank.example\r\n\
                   To: me@example.com\r\n\
                   Subject: Your statement\r\n\
                   MIME-Version: 1.0\r\n\
                   Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
                   \r\n\
                   --b1\r\n\
                   Content-Type: text/plain; charset=utf-8\r\n\
                   \r\n\
                   See HTML part\r\n\
                   --b1\r\n\
                   Content-Type: text/html; charset=utf-8\r\n\
                   \r\n\
                   <html><body><table><tr><td><table>\
                   <tr><th>Tran Date</th><th>Particulars</th><th>Amount</th><th>Dr/Cr</th><th>Balance</th></tr>\
                   <tr><td>02-05-2024</td><td>UPI/P2M/412345678901/SWIGGY</td><td>350.00</td><td>DR</td><td>9,650.00</td></tr>\
                   <tr><td>03-05-2024</td><td>ATM WDL  MG ROAD</td><td>2,000.00</td><td>DR</td><td>7,650.00</td></tr>\
                   </table></td></tr></table></body></html>\r\n\
                   --b1--\r\n";

        let rows = rows(eml.as_bytes(), "axis");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cells[1], "UPI/P2M/412345678901/SWIGGY");
        assert_eq!(rows[1].cells[1], "ATM WDL MG ROAD");
        assert_eq!(rows[1].cells[3], "DR");
    }

    #[test]
    fn test_plain_text_email_block() {
        let eml = "From: alerts@bank.example\r\n\
                   MIME-Version: 1.0\r\n\
                   Content-Type: text/plain; charset=utf-8\r\n\
                   \r\n\
                   Dear customer, your recent transactions:\r\n\
                   Tran Date  Particulars  Amount  Dr/Cr  Balance\r\n\
                   02-05-2024  UPI/P2M/412345678901/SWIGGY  350.00  DR  9,650.00\r\n\
                   Closing Balance  9,650.00\r\n\
                   Regards\r\n";

        let rows = rows(eml.as_bytes(), "axis");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells[2], "350.00");
    }
}
