//! Signal persistence

use chrono::Utc;
use rusqlite::params;

use super::{parse_datetime, parse_enum, Database};
use crate::error::{Error, Result};
use crate::models::{NewSignal, Signal, SignalStatus};

const SIGNAL_COLUMNS: &str = "id, user_id, rule, kind, signal_type, severity, message, payload, \
     dedup_key, transaction_key, status, created_at";

impl Database {
    /// Append a signal unless one with the same dedup key already exists
    ///
    /// Returns true if a new row was written.
    pub fn insert_signal(&self, signal: &NewSignal) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO signals
                (user_id, rule, kind, signal_type, severity, message, payload, dedup_key,
                 transaction_key, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                signal.user_id,
                signal.rule,
                signal.kind.as_str(),
                signal.signal_type,
                signal.severity.as_str(),
                signal.message,
                serde_json::to_string(&signal.payload)?,
                signal.dedup_key,
                signal.transaction_key,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(inserted == 1)
    }

    /// A user's signals, newest first, optionally filtered by status
    pub fn list_signals(&self, user_id: &str, status: Option<SignalStatus>) -> Result<Vec<Signal>> {
        let conn = self.conn()?;
        let signals = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM signals WHERE user_id = ? AND status = ? ORDER BY id DESC",
                    SIGNAL_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![user_id, status.as_str()], Self::row_to_signal)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM signals WHERE user_id = ? ORDER BY id DESC",
                    SIGNAL_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![user_id], Self::row_to_signal)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(signals)
    }

    pub fn accept_signal(&self, id: i64) -> Result<()> {
        self.resolve_signal(id, SignalStatus::Accepted)
    }

    pub fn dismiss_signal(&self, id: i64) -> Result<()> {
        self.resolve_signal(id, SignalStatus::Dismissed)
    }

    /// Move an active signal to a terminal status
    fn resolve_signal(&self, id: i64, status: SignalStatus) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE signals SET status = ?, updated_at = ? WHERE id = ? AND status = 'active'",
            params![status.as_str(), Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Active signal {}", id)));
        }
        Ok(())
    }

    fn row_to_signal(row: &rusqlite::Row) -> rusqlite::Result<Signal> {
        let kind: String = row.get(3)?;
        let severity: String = row.get(5)?;
        let payload: String = row.get(7)?;
        let status: String = row.get(10)?;
        let created_at: String = row.get(11)?;

        Ok(Signal {
            id: row.get(0)?,
            user_id: row.get(1)?,
            rule: row.get(2)?,
            kind: parse_enum(&kind)?,
            signal_type: row.get(4)?,
            severity: parse_enum(&severity)?,
            message: row.get(6)?,
            payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
            dedup_key: row.get(8)?,
            transaction_key: row.get(9)?,
            status: parse_enum(&status)?,
            created_at: parse_datetime(&created_at),
        })
    }
}
