//! Text-layout PDF statements

use std::panic::{self, AssertUnwindSafe};

use super::layout::LayoutRows;
use super::{BlockFilter, RowStream, StatementFormat};
use crate::error::{Error, Result};
use crate::models::RawRow;
use crate::profiles::BankProfile;

pub(super) fn extract(bytes: &[u8], profile: &BankProfile) -> Result<RowStream> {
    let text = read_text(bytes)?;
    let lines = text_lines(&text);
    tracing::debug!(lines = lines.len(), "Extracted PDF text layer");

    let block = BlockFilter::new(lines.into_iter(), profile);
    Ok(RowStream::new(
        StatementFormat::Pdf,
        LayoutRows::new(block, profile.clone()),
    ))
}

fn read_text(bytes: &[u8]) -> Result<String> {
    // pdf-extract panics on some malformed documents instead of returning an error
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes)
    }));

    match outcome {
        Ok(Ok(text)) if !text.trim().is_empty() => Ok(text),
        Ok(Ok(_)) => Err(Error::FormatUnsupported(
            "PDF has no text layer (scanned statements are not supported)".into(),
        )),
        Ok(Err(e)) => Err(Error::FormatUnsupported(format!("cannot open PDF: {}", e))),
        Err(_) => Err(Error::FormatUnsupported(
            "PDF reader failed on a malformed document".into(),
        )),
    }
}

/// One single-cell row per text line; page breaks become line breaks
pub(super) fn text_lines(text: &str) -> Vec<Result<RawRow>> {
    text.replace('\u{000C}', "\n")
        .lines()
        .enumerate()
        .map(|(i, line)| Ok(RawRow::new(i + 1, vec![normalize_line(line)])))
        .collect()
}

/// Non-breaking spaces become plain spaces; column gaps are preserved
fn normalize_line(raw: &str) -> String {
    raw.replace(['\u{00a0}', '\u{3000}'], " ").trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::BankProfileRegistry;

    #[test]
    fn test_garbage_pdf_is_unsupported() {
        let err = read_text(b"%PDF-1.4\nthis is not really a pdf").unwrap_err();
        assert!(matches!(err, Error::FormatUnsupported(_)));
    }

    #[test]
    fn test_text_layer_to_rows() {
        let registry = BankProfileRegistry::embedded().unwrap();
        let profile = registry.resolve("axis").unwrap();
        let text = "AXIS BANK LTD  Statement of Account\n\
                    Tran Date  Particulars  Amount  Dr/Cr  Balance\n\
                    02-05-2024  UPI/P2M/412345678901/SWIGGY  350.00  DR  9,650.00\n\
                    \u{000C}Tran Date  Particulars  Amount  Dr/Cr  Balance\n\
                    03-05-2024  NEFT/N123456789012/ACME CORP  50,000.00  CR  59,650.00\n\
                    MAY SALARY\n\
                    TRANSACTION TOTAL  50,350.00\n\
                    04-05-2024  NOT A ROW  1.00  DR  1.00\n";

        let block = BlockFilter::new(text_lines(text).into_iter(), &profile);
        let rows: Vec<RawRow> = LayoutRows::new(block, profile.as_ref().clone())
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_number, 3);
        assert_eq!(rows[0].cells[1], "UPI/P2M/412345678901/SWIGGY");
        assert_eq!(rows[0].cells[3], "DR");
        assert_eq!(rows[1].cells[1], "NEFT/N123456789012/ACME CORP MAY SALARY");
        assert_eq!(rows[1].cells[4], "59,650.00");
    }
}
