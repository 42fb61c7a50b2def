//! Enriched transaction operations

use rusqlite::{params, params_from_iter, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;

use super::{parse_date, parse_datetime, parse_decimal, parse_enum, Database};
use crate::error::Result;
use crate::models::{
    CategorizationResult, CategorySource, EnrichedTransaction, RawTransactionRecord,
    TransactionMetadata, TransactionQuery, UpsertOutcome,
};

const TX_COLUMNS: &str = "idempotency_key, user_id, batch_id, row_number, date, amount, direction, \
     description, reference, metadata, category, subcategory, confidence, source, enriched_at";

/// Two confidences closer than this count as the same categorization
const CONFIDENCE_EPSILON: f64 = 1e-9;

fn same_categorization(a: &CategorizationResult, b: &CategorizationResult) -> bool {
    a.category == b.category
        && a.subcategory == b.subcategory
        && a.source == b.source
        && (a.confidence - b.confidence).abs() < CONFIDENCE_EPSILON
}

impl Database {
    /// Compare-and-set upsert on the idempotency key
    ///
    /// Inserts unseen keys. For existing keys only the categorization (and the
    /// derived metadata) may change, and never when the stored source is an
    /// override. Returns what happened plus the categorization now persisted.
    pub fn upsert_transaction(
        &self,
        tx: &EnrichedTransaction,
    ) -> Result<(UpsertOutcome, CategorizationResult)> {
        let mut conn = self.conn()?;
        let db_tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let metadata = serde_json::to_string(&tx.metadata)?;
        let signature = tx.signature().key();
        let c = &tx.categorization;

        let inserted = db_tx.execute(
            r#"
            INSERT OR IGNORE INTO transactions
                (idempotency_key, user_id, batch_id, row_number, date, amount, direction,
                 description, reference, metadata, signature, category, subcategory,
                 confidence, source, enriched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                tx.idempotency_key,
                tx.user_id,
                tx.record.batch_id,
                tx.record.row_number as i64,
                tx.record.date.to_string(),
                tx.record.amount.to_string(),
                tx.record.direction.as_str(),
                tx.record.description,
                tx.record.reference,
                metadata,
                signature,
                c.category,
                c.subcategory,
                c.confidence,
                c.source.as_str(),
                tx.enriched_at.to_rfc3339(),
            ],
        )?;

        if inserted == 1 {
            db_tx.commit()?;
            return Ok((UpsertOutcome::Inserted, c.clone()));
        }

        let stored = db_tx.query_row(
            "SELECT category, subcategory, confidence, source FROM transactions WHERE idempotency_key = ?",
            params![tx.idempotency_key],
            |row| {
                let source: String = row.get(3)?;
                Ok(CategorizationResult {
                    category: row.get(0)?,
                    subcategory: row.get(1)?,
                    confidence: row.get(2)?,
                    source: parse_enum(&source)?,
                })
            },
        )?;

        let outcome = if stored.is_override() {
            UpsertOutcome::OverrideKept
        } else if same_categorization(&stored, c) {
            UpsertOutcome::Unchanged
        } else {
            db_tx.execute(
                r#"
                UPDATE transactions
                SET category = ?, subcategory = ?, confidence = ?, source = ?,
                    metadata = ?, signature = ?, enriched_at = ?
                WHERE idempotency_key = ? AND source != 'override'
                "#,
                params![
                    c.category,
                    c.subcategory,
                    c.confidence,
                    c.source.as_str(),
                    metadata,
                    signature,
                    tx.enriched_at.to_rfc3339(),
                    tx.idempotency_key,
                ],
            )?;
            UpsertOutcome::Recategorized
        };
        db_tx.commit()?;

        let persisted = match outcome {
            UpsertOutcome::Recategorized => c.clone(),
            _ => stored,
        };
        Ok((outcome, persisted))
    }

    /// Replace a non-override categorization; returns false if the row is
    /// missing or holds an override
    pub fn update_categorization(
        &self,
        idempotency_key: &str,
        result: &CategorizationResult,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE transactions
            SET category = ?, subcategory = ?, confidence = ?, source = ?
            WHERE idempotency_key = ? AND source != 'override'
            "#,
            params![
                result.category,
                result.subcategory,
                result.confidence,
                result.source.as_str(),
                idempotency_key,
            ],
        )?;
        Ok(changed == 1)
    }

    pub fn get_transaction(&self, idempotency_key: &str) -> Result<Option<EnrichedTransaction>> {
        let conn = self.conn()?;
        let tx = conn
            .query_row(
                &format!(
                    "SELECT {} FROM transactions WHERE idempotency_key = ?",
                    TX_COLUMNS
                ),
                params![idempotency_key],
                Self::row_to_transaction,
            )
            .optional()?;
        Ok(tx)
    }

    /// Enriched transactions for a user, newest first
    pub fn query_transactions(&self, query: &TransactionQuery) -> Result<Vec<EnrichedTransaction>> {
        let mut sql = format!("SELECT {} FROM transactions WHERE user_id = ?", TX_COLUMNS);
        let mut args: Vec<String> = vec![query.user_id.clone()];

        if let Some(from) = query.from {
            sql.push_str(" AND date >= ?");
            args.push(from.to_string());
        }
        if let Some(to) = query.to {
            sql.push_str(" AND date <= ?");
            args.push(to.to_string());
        }
        if let Some(category) = &query.category {
            sql.push_str(" AND category = ?");
            args.push(category.clone());
        }
        if let Some(source) = query.source {
            sql.push_str(" AND source = ?");
            args.push(source.as_str().to_string());
        }
        sql.push_str(" ORDER BY date DESC, batch_id, row_number");
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit.max(0)));
            if let Some(offset) = query.offset {
                sql.push_str(&format!(" OFFSET {}", offset.max(0)));
            }
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), Self::row_to_transaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Stored transactions of a user whose categorization may be recomputed
    pub fn list_recategorizable(&self, user_id: &str) -> Result<Vec<EnrichedTransaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE user_id = ? AND source != 'override' ORDER BY date, batch_id, row_number",
            TX_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![user_id], Self::row_to_transaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Total debits in a category between two dates (inclusive)
    pub fn category_spend(
        &self,
        user_id: &str,
        category: &str,
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    ) -> Result<Decimal> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT amount FROM transactions
            WHERE user_id = ? AND category = ? AND direction = 'debit' AND date >= ? AND date <= ?
            "#,
        )?;
        let amounts = stmt
            .query_map(
                params![user_id, category, from.to_string(), to.to_string()],
                |row| {
                    let amount: String = row.get(0)?;
                    parse_decimal(&amount)
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(amounts.into_iter().sum())
    }

    pub fn count_transactions(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Rows labeled by rules or overrides, used as classifier training data
    pub fn list_labeled_transactions(&self) -> Result<Vec<EnrichedTransaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE source IN ('rule', 'override') AND category != 'uncategorized'",
            TX_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], Self::row_to_transaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub(crate) fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<EnrichedTransaction> {
        let row_number: i64 = row.get(3)?;
        let date: String = row.get(4)?;
        let amount: String = row.get(5)?;
        let direction: String = row.get(6)?;
        let metadata: String = row.get(9)?;
        let source: String = row.get(13)?;
        let enriched_at: String = row.get(14)?;

        let metadata: TransactionMetadata = serde_json::from_str(&metadata).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Unreadable stored metadata");
            TransactionMetadata::default()
        });

        Ok(EnrichedTransaction {
            idempotency_key: row.get(0)?,
            user_id: row.get(1)?,
            record: RawTransactionRecord {
                batch_id: row.get(2)?,
                row_number: row_number as usize,
                date: parse_date(&date)?,
                amount: parse_decimal(&amount)?,
                direction: parse_enum(&direction)?,
                description: row.get(7)?,
                reference: row.get(8)?,
            },
            metadata,
            categorization: CategorizationResult {
                category: row.get(10)?,
                subcategory: row.get(11)?,
                confidence: row.get(12)?,
                source: parse_enum::<CategorySource>(&source)?,
            },
            enriched_at: parse_datetime(&enriched_at),
        })
    }
}
