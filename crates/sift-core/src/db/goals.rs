//! Goals, goal progress and goal rule toggles

use std::collections::HashMap;

use rusqlite::{params, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;

use super::{parse_date, parse_decimal, parse_enum, Database};
use crate::error::{Error, Result};
use crate::models::{Goal, GoalKind, GoalStateSnapshot, GoalStatus, NewGoal};

const GOAL_COLUMNS: &str = "id, user_id, name, kind, target_amount, current_amount, category, \
     start_date, target_date, auto_allocate_ratio, status";

impl Database {
    pub fn create_goal(&self, goal: &NewGoal) -> Result<i64> {
        if goal.target_amount <= Decimal::ZERO {
            return Err(Error::InvalidData("Goal target must be positive".into()));
        }
        if goal.kind == GoalKind::SpendingCap && goal.category.is_none() {
            return Err(Error::InvalidData("A spending cap needs a category".into()));
        }
        if let Some(ratio) = goal.auto_allocate_ratio {
            if ratio < Decimal::ZERO || ratio > Decimal::ONE {
                return Err(Error::InvalidData(
                    "auto_allocate_ratio must be within 0..1".into(),
                ));
            }
        }

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO goals (user_id, name, kind, target_amount, category, start_date,
                               target_date, auto_allocate_ratio)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                goal.user_id,
                goal.name,
                goal.kind.as_str(),
                goal.target_amount.to_string(),
                goal.category,
                goal.start_date.to_string(),
                goal.target_date.map(|d| d.to_string()),
                goal.auto_allocate_ratio.map(|r| r.to_string()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_goal(&self, id: i64) -> Result<Option<Goal>> {
        let conn = self.conn()?;
        let goal = conn
            .query_row(
                &format!("SELECT {} FROM goals WHERE id = ?", GOAL_COLUMNS),
                params![id],
                Self::row_to_goal,
            )
            .optional()?;
        Ok(goal)
    }

    pub fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM goals WHERE user_id = ? ORDER BY id",
            GOAL_COLUMNS
        ))?;
        let goals = stmt
            .query_map(params![user_id], Self::row_to_goal)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(goals)
    }

    /// Fresh snapshot of a user's goals
    pub fn goal_state(&self, user_id: &str) -> Result<GoalStateSnapshot> {
        Ok(GoalStateSnapshot {
            goals: self.list_goals(user_id)?,
        })
    }

    pub fn set_goal_status(&self, id: i64, status: GoalStatus) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE goals SET status = ? WHERE id = ?",
            params![status.as_str(), id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Goal {}", id)));
        }
        Ok(())
    }

    /// Add progress to a goal once per transaction
    ///
    /// Returns false when progress for this (goal, transaction) was already
    /// recorded. A savings goal that reaches its target becomes `achieved`.
    pub fn record_goal_progress(
        &self,
        goal_id: i64,
        amount: Decimal,
        transaction_key: &str,
    ) -> Result<bool> {
        let mut conn = self.conn()?;
        let db_tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let inserted = db_tx.execute(
            "INSERT OR IGNORE INTO goal_progress (goal_id, amount, transaction_key) VALUES (?, ?, ?)",
            params![goal_id, amount.to_string(), transaction_key],
        )?;
        if inserted == 0 {
            return Ok(false);
        }

        let (current, target, kind): (String, String, String) = db_tx
            .query_row(
                "SELECT current_amount, target_amount, kind FROM goals WHERE id = ?",
                params![goal_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Goal {}", goal_id)))?;

        let updated = parse_decimal(&current)? + amount;
        let achieved =
            parse_enum::<GoalKind>(&kind)? == GoalKind::Savings && updated >= parse_decimal(&target)?;

        db_tx.execute(
            "UPDATE goals SET current_amount = ?, status = CASE WHEN ? THEN 'achieved' ELSE status END WHERE id = ?",
            params![updated.to_string(), achieved, goal_id],
        )?;
        db_tx.commit()?;
        Ok(true)
    }

    pub fn goal_progress_recorded(&self, goal_id: i64, transaction_key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM goal_progress WHERE goal_id = ? AND transaction_key = ?",
            params![goal_id, transaction_key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Enable or disable a registered goal rule at runtime
    pub fn set_rule_enabled(&self, rule: &str, enabled: bool) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO goal_rule_toggles (rule, enabled) VALUES (?, ?)
            ON CONFLICT(rule) DO UPDATE SET enabled = excluded.enabled, updated_at = CURRENT_TIMESTAMP
            "#,
            params![rule, enabled],
        )?;
        Ok(())
    }

    /// Rule name -> enabled, for rules that have been toggled
    pub fn rule_toggles(&self) -> Result<HashMap<String, bool>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT rule, enabled FROM goal_rule_toggles")?;
        let toggles = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<HashMap<String, bool>>>()?;
        Ok(toggles)
    }

    fn row_to_goal(row: &rusqlite::Row) -> rusqlite::Result<Goal> {
        let kind: String = row.get(3)?;
        let target: String = row.get(4)?;
        let current: String = row.get(5)?;
        let start_date: String = row.get(7)?;
        let target_date: Option<String> = row.get(8)?;
        let ratio: Option<String> = row.get(9)?;
        let status: String = row.get(10)?;

        Ok(Goal {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            kind: parse_enum(&kind)?,
            target_amount: parse_decimal(&target)?,
            current_amount: parse_decimal(&current)?,
            category: row.get(6)?,
            start_date: parse_date(&start_date)?,
            target_date: target_date.as_deref().map(parse_date).transpose()?,
            auto_allocate_ratio: ratio.as_deref().map(parse_decimal).transpose()?,
            status: parse_enum(&status)?,
        })
    }
}
