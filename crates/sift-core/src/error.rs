//! Error types for Sift

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The byte signature matched no known reader; nothing from the batch can be trusted.
    #[error("Unsupported statement format: {0}")]
    FormatUnsupported(String),

    #[error("No bank profile registered for code: {0}")]
    BankConfigMissing(String),

    #[error("Row {row}: {reason}")]
    RowParse { row: usize, reason: String },

    #[error("Row {row}: ambiguous or implausible date '{value}'")]
    AmbiguousDateFormat { row: usize, value: String },

    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("Goal rule '{rule}' failed: {reason}")]
    RuleExecution { rule: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Email parsing error: {0}")]
    Email(#[from] mailparse::MailParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// True for errors scoped to a single statement row (skipped and counted, not fatal)
    pub fn is_row_scoped(&self) -> bool {
        matches!(
            self,
            Error::RowParse { .. } | Error::AmbiguousDateFormat { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
