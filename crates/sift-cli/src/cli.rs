//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sift_core::ConfigPaths;

/// Sift - Turn bank statements into categorized, goal-aware transactions
#[derive(Parser)]
#[command(name = "sift")]
#[command(about = "Statement ingestion, categorization and goal signals", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "sift.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set SIFT_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// Engine config file (defaults to ~/.local/share/sift/sift.toml, then built-in)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Bank profiles file (extends the built-in profiles)
    #[arg(long, global = true)]
    pub banks: Option<PathBuf>,

    /// Categorization rules file (replaces the built-in rules)
    #[arg(long, global = true)]
    pub rules: Option<PathBuf>,

    /// Category taxonomy file (replaces the built-in taxonomy)
    #[arg(long, global = true)]
    pub taxonomy: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn config_paths(&self) -> ConfigPaths {
        ConfigPaths {
            engine: self.config.clone(),
            banks: self.banks.clone(),
            rules: self.rules.clone(),
            taxonomy: self.taxonomy.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Ingest a bank statement (spreadsheet, PDF or email)
    ///
    /// Spreadsheets are read as delimited text. Export Excel workbooks
    /// (.xlsx, .xls) to CSV before ingesting them.
    Ingest {
        /// Statement file
        #[arg(short, long)]
        file: PathBuf,

        /// Bank profile code (see `sift profiles`)
        #[arg(short, long)]
        bank: String,

        /// User the statement belongs to
        #[arg(short, long, default_value = "default")]
        user: String,

        /// Declared format: auto, spreadsheet (CSV/TSV), pdf, email
        #[arg(long, default_value = "auto")]
        format: String,

        /// First day covered by the statement (YYYY-MM-DD)
        #[arg(long, requires = "period_end")]
        period_start: Option<String>,

        /// Last day covered by the statement (YYYY-MM-DD)
        #[arg(long, requires = "period_start")]
        period_end: Option<String>,

        /// Treat this date as today for date plausibility checks (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<String>,
    },

    /// List enriched transactions
    Transactions {
        #[arg(short, long, default_value = "default")]
        user: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Filter by category code
        #[arg(long)]
        category: Option<String>,

        /// Filter by categorization source: rule, ml, override
        #[arg(long)]
        source: Option<String>,

        /// Maximum rows to show
        #[arg(short, long, default_value = "50")]
        limit: i64,

        #[arg(long, default_value = "0")]
        offset: i64,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Override a transaction's category (also applies to future lookalikes)
    Override {
        /// Transaction idempotency key (a unique prefix is enough)
        key: String,

        /// Category code
        category: String,

        /// Subcategory code
        subcategory: Option<String>,

        #[arg(short, long, default_value = "default")]
        user: String,
    },

    /// Re-apply rules and the classifier to stored transactions (overrides are kept)
    Recategorize {
        #[arg(short, long, default_value = "default")]
        user: String,
    },

    /// Show ingestion batches and their diagnostics
    Batches {
        #[arg(short, long, default_value = "default")]
        user: String,

        /// Show one batch in detail, including skipped rows
        #[arg(long)]
        show: Option<String>,
    },

    /// List bank profiles
    Profiles,

    /// List categorization rules and the taxonomy
    Rules,

    /// Train the naive Bayes classifier from overrides and rule-labeled rows
    Train {
        /// Where to write the model (defaults to the configured model path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also export the training examples as JSONL
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Manage goals and goal rules
    Goals {
        #[command(subcommand)]
        action: GoalsAction,
    },

    /// List and resolve goal signals
    Signals {
        #[command(subcommand)]
        action: Option<SignalsAction>,
    },
}

#[derive(Subcommand)]
pub enum GoalsAction {
    /// List goals
    List {
        #[arg(short, long, default_value = "default")]
        user: String,
    },

    /// Create a goal
    Create {
        /// Goal name
        name: String,

        /// Goal kind: savings or spending_cap
        #[arg(short, long, default_value = "savings")]
        kind: String,

        /// Target amount (savings) or monthly cap (spending_cap)
        #[arg(short, long)]
        target: String,

        /// Category (spending caps only)
        #[arg(long)]
        category: Option<String>,

        /// Start date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        start: Option<String>,

        /// Target date (YYYY-MM-DD)
        #[arg(long)]
        by: Option<String>,

        /// Share of each income credit to allocate automatically (0..1)
        #[arg(long)]
        auto_allocate: Option<String>,

        #[arg(short, long, default_value = "default")]
        user: String,
    },

    /// Pause a goal
    Pause { id: i64 },

    /// Resume a paused goal
    Resume { id: i64 },

    /// List goal rules in priority order with their enabled state
    Rules,

    /// Enable a goal rule
    Enable { rule: String },

    /// Disable a goal rule
    Disable { rule: String },
}

#[derive(Subcommand)]
pub enum SignalsAction {
    /// List signals, newest first
    List {
        #[arg(short, long, default_value = "default")]
        user: String,

        /// Filter by status: active, accepted, dismissed (default: active)
        #[arg(long)]
        status: Option<String>,

        /// Include every status
        #[arg(long, conflicts_with = "status")]
        all: bool,

        /// Print JSON instead of a list
        #[arg(long)]
        json: bool,
    },

    /// Accept a suggestion
    Accept { id: i64 },

    /// Dismiss a signal or suggestion
    Dismiss { id: i64 },
}
