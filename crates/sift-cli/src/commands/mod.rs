//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Database setup (init) and shared utilities (open_db, load_enricher)
//! - `ingest` - Statement ingestion, recategorization and batch diagnostics
//! - `transactions` - Transaction queries and overrides
//! - `catalog` - Bank profiles, categorization rules and taxonomy
//! - `training` - Naive Bayes training and example export
//! - `goals` - Goals and goal rule toggles
//! - `signals` - Goal signals and suggestions

pub mod catalog;
pub mod core;
pub mod goals;
pub mod ingest;
pub mod signals;
pub mod training;
pub mod transactions;

// Re-export command functions for main.rs
pub use catalog::*;
pub use core::*;
pub use goals::*;
pub use ingest::*;
pub use signals::*;
pub use training::*;
pub use transactions::*;

use anyhow::{Context, Result};
use chrono::NaiveDate;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Parse a YYYY-MM-DD argument
pub fn parse_date_arg(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}': expected YYYY-MM-DD", value))
}

pub fn parse_optional_date(value: Option<&str>) -> Result<Option<NaiveDate>> {
    value.map(parse_date_arg).transpose()
}
