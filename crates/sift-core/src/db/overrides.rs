//! User override operations

use chrono::Utc;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use super::{parse_datetime, Database};
use crate::categorize::OverrideStore;
use crate::error::{Error, Result};
use crate::models::{CategorySource, Override, TransactionSignature};

impl Database {
    /// Override one transaction's category and remember it for its signature.
    /// Other rows already carrying this signature's override are updated too.
    ///
    /// Callers validate the category against the taxonomy first.
    pub fn set_override(
        &self,
        user_id: &str,
        idempotency_key: &str,
        category: &str,
        subcategory: Option<&str>,
    ) -> Result<Override> {
        let mut conn = self.conn()?;
        let db_tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let signature: String = db_tx
            .query_row(
                "SELECT signature FROM transactions WHERE idempotency_key = ? AND user_id = ?",
                params![idempotency_key, user_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Transaction {} for user {}",
                    idempotency_key, user_id
                ))
            })?;

        let now = Utc::now().to_rfc3339();
        db_tx.execute(
            r#"
            INSERT INTO overrides (user_id, signature, category, subcategory, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id, signature) DO UPDATE SET
                category = excluded.category,
                subcategory = excluded.subcategory,
                created_at = excluded.created_at
            "#,
            params![user_id, signature, category, subcategory, now],
        )?;

        // Rows that inherited the previous override for this signature follow the edit
        let updated = db_tx.execute(
            r#"
            UPDATE transactions
            SET category = ?1, subcategory = ?2, confidence = 1.0, source = ?3
            WHERE idempotency_key = ?4
               OR (user_id = ?5 AND signature = ?6 AND source = ?3)
            "#,
            params![
                category,
                subcategory,
                CategorySource::Override.as_str(),
                idempotency_key,
                user_id,
                signature
            ],
        )?;

        let stored = db_tx.query_row(
            "SELECT id, user_id, signature, category, subcategory, created_at FROM overrides WHERE user_id = ? AND signature = ?",
            params![user_id, signature],
            Self::row_to_override,
        )?;
        db_tx.commit()?;

        tracing::info!(
            user_id,
            signature = %stored.signature,
            category,
            updated,
            "Override recorded"
        );
        Ok(stored)
    }

    pub fn find_override_by_signature(
        &self,
        user_id: &str,
        signature: &str,
    ) -> Result<Option<Override>> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT id, user_id, signature, category, subcategory, created_at FROM overrides WHERE user_id = ? AND signature = ?",
                params![user_id, signature],
                Self::row_to_override,
            )
            .optional()?;
        Ok(found)
    }

    pub fn list_overrides(&self, user_id: &str) -> Result<Vec<Override>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, signature, category, subcategory, created_at FROM overrides WHERE user_id = ? ORDER BY created_at DESC",
        )?;
        let overrides = stmt
            .query_map(params![user_id], Self::row_to_override)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(overrides)
    }

    fn row_to_override(row: &rusqlite::Row) -> rusqlite::Result<Override> {
        let created_at: String = row.get(5)?;
        Ok(Override {
            id: row.get(0)?,
            user_id: row.get(1)?,
            signature: row.get(2)?,
            category: row.get(3)?,
            subcategory: row.get(4)?,
            created_at: parse_datetime(&created_at),
        })
    }
}

impl OverrideStore for Database {
    fn find_override(&self, signature: &TransactionSignature) -> Result<Option<Override>> {
        self.find_override_by_signature(&signature.user_id, &signature.key())
    }
}
