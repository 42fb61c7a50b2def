//! Delimited spreadsheet exports (CSV, TSV, semicolon-separated)

use std::io::Cursor;

use csv::{ReaderBuilder, Trim};

use super::{BlockFilter, RowStream, StatementFormat};
use crate::error::{Error, Result};
use crate::models::RawRow;
use crate::profiles::BankProfile;

pub(super) fn extract(bytes: &[u8], profile: &BankProfile) -> Result<RowStream> {
    let text = profile.encoding.decode(bytes).ok_or_else(|| {
        Error::FormatUnsupported(format!(
            "statement is not valid {:?} text",
            profile.encoding
        ))
    })?;

    let reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .delimiter(profile.delimiter)
        .from_reader(Cursor::new(text.into_bytes()));

    let rows = reader.into_records().enumerate().map(|(index, result)| {
        let record = result.map_err(Error::from)?;
        // Source line keeps diagnostics pointing at what the user sees in the file
        let row_number = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(index + 1);
        Ok(RawRow::new(
            row_number,
            record.iter().map(|cell| cell.trim().to_string()).collect(),
        ))
    });

    Ok(RowStream::new(
        StatementFormat::Spreadsheet,
        BlockFilter::new(rows, profile),
    ))
}

#[cfg(test)]
mod tests {
    use crate::extract::{extract, FormatHint};
    use crate::profiles::BankProfileRegistry;

    #[test]
    fn test_scenario_row_cells_trimmed() {
        let registry = BankProfileRegistry::embedded().unwrap();
        let profile = registry.resolve("generic_dr_cr").unwrap();
        let csv = "2024-05-01, UPI/RRN123456789/JohnStore, 450.00, DR\n";

        let rows: Vec<_> = extract(csv.as_bytes(), FormatHint::Auto, &profile)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row_number, 1);
        assert_eq!(
            rows[0].cells,
            vec!["2024-05-01", "UPI/RRN123456789/JohnStore", "450.00", "DR"]
        );
    }

    #[test]
    fn test_header_row_dropped_and_lines_numbered() {
        let registry = BankProfileRegistry::embedded().unwrap();
        let profile = registry.resolve("chase").unwrap();
        let csv = "Transaction Date,Post Date,Description,Category,Type,Amount,Memo\n\
                   01/15/2024,01/16/2024,NETFLIX.COM,Entertainment,Sale,-15.99,\n\
                   \n\
                   01/14/2024,01/15/2024,STARBUCKS,Food & Drink,Sale,-5.50,\n";

        let rows: Vec<_> = extract(csv.as_bytes(), FormatHint::Spreadsheet, &profile)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_number, 2);
        assert_eq!(rows[0].cell(2), Some("NETFLIX.COM"));
        assert_eq!(rows[1].row_number, 4);
    }

    #[test]
    fn test_semicolon_latin1_export() {
        let registry = BankProfileRegistry::embedded().unwrap();
        let profile = registry.resolve("eu_comma").unwrap();
        let bytes = b"Buchungstag;Verwendungszweck;Betrag\n02.05.2024;Caf\xe9 Central;-4,50\n";

        let rows: Vec<_> = extract(bytes, FormatHint::Auto, &profile)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells, vec!["02.05.2024", "Café Central", "-4,50"]);
    }
}
