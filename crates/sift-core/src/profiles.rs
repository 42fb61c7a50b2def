//! Bank profile registry
//!
//! A profile is pure data describing one bank's export layout. Profiles are
//! loaded from TOML once and never mutated; the registry hands out shared
//! references.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;

use crate::config::read_override;
use crate::error::{Error, Result};
use crate::models::Direction;

/// Embedded default profiles (compiled into binary)
const DEFAULT_BANKS: &str = include_str!("../../../config/banks.toml");

pub const BANKS_FILE: &str = "banks.toml";

/// How a row's money direction is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignConvention {
    /// Single amount column; negative values are debits
    NegativeIsDebit,
    /// Single amount column; negative values are credits (card statements)
    NegativeIsCredit,
    /// Separate withdrawal and deposit columns
    DebitCreditColumns,
    /// Unsigned amount plus a DR/CR marker column
    Indicator,
}

impl SignConvention {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NegativeIsDebit => "negative_is_debit",
            Self::NegativeIsCredit => "negative_is_credit",
            Self::DebitCreditColumns => "debit_credit_columns",
            Self::Indicator => "indicator",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum TextEncoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
}

impl TextEncoding {
    /// Decode statement bytes; `None` when the bytes are not valid in this encoding
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => {
                let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                std::str::from_utf8(bytes).ok().map(str::to_string)
            }
            Self::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

/// Cell positions (0-based) of each field
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnMap {
    pub date: usize,
    pub description: usize,
    pub amount: Option<usize>,
    pub debit: Option<usize>,
    pub credit: Option<usize>,
    pub direction: Option<usize>,
    pub reference: Option<usize>,
    pub balance: Option<usize>,
}

impl ColumnMap {
    fn all(&self) -> impl Iterator<Item = usize> + '_ {
        [
            Some(self.date),
            Some(self.description),
            self.amount,
            self.debit,
            self.credit,
            self.direction,
            self.reference,
            self.balance,
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Debug, Clone)]
pub struct BankProfile {
    pub code: String,
    pub name: String,
    pub columns: ColumnMap,
    /// chrono format strings, tried in order
    pub date_formats: Vec<String>,
    pub decimal_separator: char,
    pub thousands_separator: Option<char>,
    pub sign_convention: SignConvention,
    pub debit_markers: Vec<String>,
    pub credit_markers: Vec<String>,
    /// Leading rows dropped unconditionally
    pub skip_rows: usize,
    /// Text identifying the column header row; everything up to it is dropped
    pub header_marker: Option<String>,
    /// Text identifying the end of the transaction block
    pub footer_markers: Vec<String>,
    pub encoding: TextEncoding,
    pub delimiter: u8,
    /// Regex with named groups used when PDF/plain-text layout splitting fails
    pub pdf_row_pattern: Option<Regex>,
}

impl BankProfile {
    /// Cells a full row carries (every mapped column)
    pub fn column_count(&self) -> usize {
        self.columns.all().max().map_or(0, |max| max + 1)
    }

    /// Cells a row must carry to be parseable (optional reference/balance excluded)
    pub fn required_columns(&self) -> usize {
        let c = &self.columns;
        [Some(c.date), Some(c.description), c.amount, c.debit, c.credit, c.direction]
            .into_iter()
            .flatten()
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Interpret a DR/CR marker per this profile
    pub fn direction_marker(&self, text: &str) -> Option<Direction> {
        let text = text.trim();
        if self.debit_markers.iter().any(|m| m.eq_ignore_ascii_case(text)) {
            Some(Direction::Debit)
        } else if self.credit_markers.iter().any(|m| m.eq_ignore_ascii_case(text)) {
            Some(Direction::Credit)
        } else {
            None
        }
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::Config(format!("bank '{}': {}", self.code, msg)));

        if self.code.trim().is_empty() {
            return Err(Error::Config("bank profile with empty code".into()));
        }
        if self.date_formats.is_empty() {
            return invalid("at least one date format is required");
        }
        if self.thousands_separator == Some(self.decimal_separator) {
            return invalid("decimal and thousands separators must differ");
        }

        let c = &self.columns;
        match self.sign_convention {
            SignConvention::NegativeIsDebit | SignConvention::NegativeIsCredit => {
                if c.amount.is_none() {
                    return invalid("signed amount conventions need an amount column");
                }
            }
            SignConvention::DebitCreditColumns => {
                if c.debit.is_none() || c.credit.is_none() {
                    return invalid("debit_credit_columns needs debit and credit columns");
                }
            }
            SignConvention::Indicator => {
                if c.amount.is_none() || c.direction.is_none() {
                    return invalid("indicator needs amount and direction columns");
                }
                if self.debit_markers.is_empty() || self.credit_markers.is_empty() {
                    return invalid("indicator needs debit and credit markers");
                }
            }
        }

        Ok(())
    }
}

/// Registry of profiles keyed by lowercase bank code
#[derive(Debug, Clone, Default)]
pub struct BankProfileRegistry {
    profiles: BTreeMap<String, Arc<BankProfile>>,
}

impl BankProfileRegistry {
    /// Embedded defaults extended by the user's banks.toml (explicit path or data dir)
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut registry = Self::embedded()?;
        if let Some(content) = read_override(explicit, BANKS_FILE)? {
            let overrides = Self::from_toml_str(&content)?;
            tracing::debug!(count = overrides.profiles.len(), "Loaded bank profile overrides");
            registry.profiles.extend(overrides.profiles);
        }
        Ok(registry)
    }

    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(DEFAULT_BANKS)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawBanks = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid banks.toml: {}", e)))?;

        let mut registry = Self::default();
        for bank in raw.bank {
            let profile = bank.into_profile()?;
            registry.register(profile)?;
        }
        Ok(registry)
    }

    /// Add or replace a profile
    pub fn register(&mut self, profile: BankProfile) -> Result<()> {
        profile.validate()?;
        self.profiles
            .insert(profile.code.to_lowercase(), Arc::new(profile));
        Ok(())
    }

    pub fn resolve(&self, bank_code: &str) -> Result<Arc<BankProfile>> {
        self.profiles
            .get(&bank_code.trim().to_lowercase())
            .cloned()
            .ok_or_else(|| Error::BankConfigMissing(bank_code.to_string()))
    }

    pub fn codes(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &BankProfile> {
        self.profiles.values().map(|p| p.as_ref())
    }
}

#[derive(Debug, Deserialize)]
struct RawBanks {
    #[serde(default)]
    bank: Vec<RawBank>,
}

#[derive(Debug, Deserialize)]
struct RawBank {
    code: String,
    name: Option<String>,
    columns: ColumnMap,
    date_formats: Vec<String>,
    decimal_separator: Option<char>,
    thousands_separator: Option<String>,
    sign_convention: SignConvention,
    debit_markers: Option<Vec<String>>,
    credit_markers: Option<Vec<String>>,
    skip_rows: Option<usize>,
    header_marker: Option<String>,
    footer_markers: Option<Vec<String>>,
    encoding: Option<TextEncoding>,
    delimiter: Option<char>,
    pdf_row_pattern: Option<String>,
}

impl RawBank {
    fn into_profile(self) -> Result<BankProfile> {
        let decimal_separator = self.decimal_separator.unwrap_or('.');
        // Empty string disables thousands grouping
        let thousands_separator = match self.thousands_separator {
            None => Some(if decimal_separator == ',' { '.' } else { ',' }),
            Some(s) => s.chars().next(),
        };

        let delimiter = self.delimiter.unwrap_or(',');
        if !delimiter.is_ascii() {
            return Err(Error::Config(format!(
                "bank '{}': delimiter must be a single ASCII character",
                self.code
            )));
        }

        let pdf_row_pattern = self
            .pdf_row_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()?;

        Ok(BankProfile {
            name: self.name.unwrap_or_else(|| self.code.clone()),
            code: self.code,
            columns: self.columns,
            date_formats: self.date_formats,
            decimal_separator,
            thousands_separator,
            sign_convention: self.sign_convention,
            debit_markers: self
                .debit_markers
                .unwrap_or_else(|| vec!["DR".into(), "D".into(), "DEBIT".into()]),
            credit_markers: self
                .credit_markers
                .unwrap_or_else(|| vec!["CR".into(), "C".into(), "CREDIT".into()]),
            skip_rows: self.skip_rows.unwrap_or(0),
            header_marker: self.header_marker.filter(|m| !m.trim().is_empty()),
            footer_markers: self.footer_markers.unwrap_or_default(),
            encoding: self.encoding.unwrap_or_default(),
            delimiter: delimiter as u8,
            pdf_row_pattern,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_profile(toml_bank: &str) -> BankProfile {
    let registry = BankProfileRegistry::from_toml_str(toml_bank).unwrap();
    let profile = registry.profiles().next().unwrap().clone();
    profile
}
