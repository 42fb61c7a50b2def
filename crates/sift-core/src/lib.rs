//! Sift Core Library
//!
//! Statement ingestion and goal tracking for the Sift personal finance app:
//! - Bank profiles describing each bank's export layout
//! - Format extraction for spreadsheet, PDF and email statements
//! - Statement parsing into normalized transaction records
//! - Description metadata (references, counterparties, channels, MCCs)
//! - Categorization: user overrides, deterministic rules, classifier fallback
//! - Idempotent enrichment and persistence (SQLite, optionally encrypted)
//! - Goal rule engine emitting signals and suggestions per transaction
//! - Naive Bayes training from overrides and rule-labeled history

pub mod categorize;
pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod goals;
pub mod metadata;
pub mod models;
pub mod parser;
pub mod profiles;
pub mod taxonomy;
pub mod training;

/// Test utilities including mock Ollama server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use categorize::{Categorizer, ClassifierClient, NaiveBayesModel, RuleSet};
pub use config::{ConfigPaths, EngineConfig};
pub use db::Database;
pub use enrich::{Batch, Enricher, EnrichmentReport, IngestRequest, RecategorizeReport};
pub use error::{Error, Result};
pub use extract::{FormatHint, StatementFormat};
pub use goals::{init_goal_rules, GoalDispatcher, GoalRule, GoalRuleEngine, GoalServices};
pub use metadata::MetadataExtractor;
pub use parser::{ParseOptions, StatementParser};
pub use profiles::{BankProfile, BankProfileRegistry};
pub use taxonomy::Taxonomy;
pub use training::{TrainingDataGenerator, TrainingStats};
