//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_enricher` - Wire the enrichment pipeline from config files
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{Context, Result};
use sift_core::{ConfigPaths, Database, Enricher};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

pub fn load_enricher(db: Database, paths: &ConfigPaths) -> Result<Enricher> {
    Enricher::load(db, paths).context("Failed to load configuration")
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        let encrypted = db.is_encrypted().unwrap_or(false);
        if encrypted {
            println!("   🔒 Encryption: ENABLED");
        } else {
            println!("   ⚠️  Encryption requested but not active");
        }
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Check your bank profile: sift profiles");
    println!("  2. Ingest a statement:      sift ingest --file statement.csv --bank <code>");
    println!("  3. Review signals:          sift signals");

    Ok(())
}
