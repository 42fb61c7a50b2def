//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `transactions` - Enriched transactions and the compare-and-set upsert
//! - `overrides` - User category overrides keyed by transaction signature
//! - `batches` - Ingestion summaries and skipped-row diagnostics
//! - `goals` - Goals, goal progress and goal rule toggles
//! - `signals` - Signals and suggestions emitted by goal rules

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rust_decimal::Decimal;

use crate::error::{Error, Result};

mod batches;
mod goals;
mod overrides;
mod signals;
mod transactions;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "SIFT_DB_KEY";

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this would invalidate all existing encrypted databases
    const APP_SALT: &[u8; 16] = b"sift-salt-v1-fix";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let hash = Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite CURRENT_TIMESTAMP format
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_date(s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| conversion_error(s, e))
}

pub(crate) fn parse_decimal(s: &str) -> rusqlite::Result<Decimal> {
    s.parse::<Decimal>().map_err(|e| conversion_error(s, e))
}

/// Parse an enum column stored via `as_str`
pub(crate) fn parse_enum<T>(s: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    s.parse::<T>()
        .map_err(|e| conversion_error(s, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

fn conversion_error<E>(value: &str, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    tracing::warn!(value, error = %e, "Unreadable column value");
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `SIFT_DB_KEY` to be set. Use `new_unencrypted()` for
    /// development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases.",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let key_pragma = passphrase
            .map(derive_key)
            .transpose()?
            .map(|key| format!("PRAGMA key = 'x\"{}\"';", key));

        // Every pooled connection gets the key, a busy timeout and FK enforcement
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            if let Some(pragma) = &key_pragma {
                conn.execute_batch(pragma)?;
            }
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` because every pooled
    /// connection would otherwise see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "sift_test_{}_{}.db",
            std::process::id(),
            id
        ));

        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }

        Self::new_unencrypted(&path.to_string_lossy())
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the single writer
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Enriched transactions, unique by idempotency key
            CREATE TABLE IF NOT EXISTS transactions (
                idempotency_key TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                batch_id TEXT NOT NULL,
                row_number INTEGER NOT NULL,
                date TEXT NOT NULL,
                amount TEXT NOT NULL,
                direction TEXT NOT NULL,
                description TEXT NOT NULL,
                reference TEXT,
                metadata TEXT NOT NULL,
                signature TEXT NOT NULL,
                category TEXT NOT NULL,
                subcategory TEXT,
                confidence REAL NOT NULL,
                source TEXT NOT NULL,
                enriched_at TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(user_id, date);
            CREATE INDEX IF NOT EXISTS idx_transactions_user_category ON transactions(user_id, category);
            CREATE INDEX IF NOT EXISTS idx_transactions_user_signature ON transactions(user_id, signature);
            CREATE INDEX IF NOT EXISTS idx_transactions_batch ON transactions(batch_id);

            -- User overrides; one per (user, signature)
            CREATE TABLE IF NOT EXISTS overrides (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                signature TEXT NOT NULL,
                category TEXT NOT NULL,
                subcategory TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(user_id, signature)
            );

            -- One row per ingested batch; re-ingesting replaces the summary
            CREATE TABLE IF NOT EXISTS ingestion_batches (
                batch_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                bank_code TEXT NOT NULL,
                format TEXT,
                rows_total INTEGER NOT NULL,
                rows_parsed INTEGER NOT NULL,
                rows_skipped INTEGER NOT NULL,
                summary TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_batches_user ON ingestion_batches(user_id);

            CREATE TABLE IF NOT EXISTS skipped_rows (
                id INTEGER PRIMARY KEY,
                batch_id TEXT NOT NULL REFERENCES ingestion_batches(batch_id) ON DELETE CASCADE,
                row_number INTEGER NOT NULL,
                reason TEXT NOT NULL,
                detail TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_skipped_rows_batch ON skipped_rows(batch_id);

            -- Savings goals and spending caps
            CREATE TABLE IF NOT EXISTS goals (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                target_amount TEXT NOT NULL,
                current_amount TEXT NOT NULL DEFAULT '0',
                category TEXT,
                start_date TEXT NOT NULL,
                target_date TEXT,
                auto_allocate_ratio TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_goals_user ON goals(user_id);

            -- Progress entries; one per (goal, transaction) so replays never double count
            CREATE TABLE IF NOT EXISTS goal_progress (
                id INTEGER PRIMARY KEY,
                goal_id INTEGER NOT NULL REFERENCES goals(id) ON DELETE CASCADE,
                amount TEXT NOT NULL,
                transaction_key TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(goal_id, transaction_key)
            );

            -- Runtime enable/disable switches for registered goal rules
            CREATE TABLE IF NOT EXISTS goal_rule_toggles (
                rule TEXT PRIMARY KEY,
                enabled INTEGER NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Signals and suggestions; append-only apart from status
            CREATE TABLE IF NOT EXISTS signals (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                rule TEXT NOT NULL,
                kind TEXT NOT NULL,
                signal_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                message TEXT NOT NULL,
                payload TEXT NOT NULL,
                dedup_key TEXT NOT NULL UNIQUE,
                transaction_key TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL,
                updated_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_signals_user_status ON signals(user_id, status);
            "#,
        )?;

        tracing::debug!(path = %self.db_path, "Database migrations applied");
        Ok(())
    }
}
