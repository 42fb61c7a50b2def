//! Ingestion batch history

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, parse_enum, Database};
use crate::error::Result;
use crate::models::{IngestionSummary, SkippedRow};

impl Database {
    /// Store (or replace, on re-ingestion) a batch summary and its skipped rows
    pub fn record_batch(&self, summary: &IngestionSummary) -> Result<()> {
        let mut conn = self.conn()?;
        let db_tx = conn.transaction()?;

        // Skipped rows live in their own table
        let stored = IngestionSummary {
            skipped: Vec::new(),
            ..summary.clone()
        };
        let now = Utc::now().to_rfc3339();
        let created_at = summary
            .created_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| now.clone());

        db_tx.execute(
            r#"
            INSERT INTO ingestion_batches
                (batch_id, user_id, bank_code, format, rows_total, rows_parsed, rows_skipped,
                 summary, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(batch_id) DO UPDATE SET
                format = excluded.format,
                rows_total = excluded.rows_total,
                rows_parsed = excluded.rows_parsed,
                rows_skipped = excluded.rows_skipped,
                summary = excluded.summary,
                updated_at = excluded.updated_at
            "#,
            params![
                summary.batch_id,
                summary.user_id,
                summary.bank_code,
                summary.format,
                summary.rows_total as i64,
                summary.rows_parsed as i64,
                summary.rows_skipped as i64,
                serde_json::to_string(&stored)?,
                created_at,
                now,
            ],
        )?;

        db_tx.execute(
            "DELETE FROM skipped_rows WHERE batch_id = ?",
            params![summary.batch_id],
        )?;
        {
            let mut stmt = db_tx.prepare(
                "INSERT INTO skipped_rows (batch_id, row_number, reason, detail) VALUES (?, ?, ?, ?)",
            )?;
            for skipped in &summary.skipped {
                stmt.execute(params![
                    summary.batch_id,
                    skipped.row_number as i64,
                    skipped.reason.as_str(),
                    skipped.detail,
                ])?;
            }
        }

        db_tx.commit()?;
        Ok(())
    }

    pub fn get_batch_summary(&self, batch_id: &str) -> Result<Option<IngestionSummary>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT summary, created_at FROM ingestion_batches WHERE batch_id = ?",
                params![batch_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        let Some((json, created_at)) = row else {
            return Ok(None);
        };

        let mut summary: IngestionSummary = serde_json::from_str(&json)?;
        summary.created_at = Some(parse_datetime(&created_at));
        summary.skipped = self.list_skipped_rows(batch_id)?;
        Ok(Some(summary))
    }

    /// A user's batches, most recent first
    pub fn list_batches(&self, user_id: &str) -> Result<Vec<IngestionSummary>> {
        let batch_ids: Vec<String> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT batch_id FROM ingestion_batches WHERE user_id = ? ORDER BY updated_at DESC",
            )?;
            let ids = stmt
                .query_map(params![user_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            ids
        };

        let mut summaries = Vec::with_capacity(batch_ids.len());
        for batch_id in batch_ids {
            if let Some(summary) = self.get_batch_summary(&batch_id)? {
                summaries.push(summary);
            }
        }
        Ok(summaries)
    }

    pub fn list_skipped_rows(&self, batch_id: &str) -> Result<Vec<SkippedRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT row_number, reason, detail FROM skipped_rows WHERE batch_id = ? ORDER BY row_number",
        )?;
        let rows = stmt
            .query_map(params![batch_id], |row| {
                let row_number: i64 = row.get(0)?;
                let reason: String = row.get(1)?;
                Ok(SkippedRow {
                    row_number: row_number as usize,
                    reason: parse_enum(&reason)?,
                    detail: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
