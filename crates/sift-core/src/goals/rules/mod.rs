//! Built-in goal rules

mod category_budget;
mod goal_drift;
mod large_expense;
mod surplus_allocation;
mod uncategorized_review;

pub use category_budget::CategoryBudgetRule;
pub use goal_drift::GoalDriftRule;
pub use large_expense::LargeExpenseRule;
pub use surplus_allocation::SurplusAllocationRule;
pub use uncategorized_review::UncategorizedReviewRule;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use crate::config::GoalRulesConfig;
use crate::error::{Error, Result};
use crate::models::{
    Direction, EnrichedTransaction, Goal, GoalKind, NewSignal, Severity, SignalKind,
};

use super::engine::RuleExecutionContext;

/// A signal tied to the context's transaction with neutral defaults
fn draft(
    ctx: &RuleExecutionContext,
    rule: &'static str,
    signal_type: &str,
    dedup_key: String,
) -> NewSignal {
    NewSignal {
        user_id: ctx.user_id.clone(),
        rule: rule.to_string(),
        kind: SignalKind::Signal,
        signal_type: signal_type.to_string(),
        severity: Severity::Info,
        message: String::new(),
        payload: serde_json::Value::Null,
        dedup_key,
        transaction_key: Some(ctx.transaction.idempotency_key.clone()),
    }
}

/// First and last day of the month containing `date`
fn month_bounds(date: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
    let invalid = || Error::InvalidData(format!("No month bounds for {}", date));
    let first = date.with_day(1).ok_or_else(invalid)?;
    let next_month = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    };
    let last = next_month.and_then(|d| d.pred_opt()).ok_or_else(invalid)?;
    Ok((first, last))
}

/// Whether a transaction is income large enough to allocate from
fn is_allocatable_income(tx: &EnrichedTransaction, config: &GoalRulesConfig) -> bool {
    tx.record.direction == Direction::Credit
        && config
            .income_categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&tx.categorization.category))
        && tx.record.amount >= config.min_surplus
}

/// Amount the surplus rule moves from `tx` into `goal`, if any
///
/// Shared with the drift rule so both see the same allocation whichever runs first.
fn planned_allocation(
    tx: &EnrichedTransaction,
    goal: &Goal,
    config: &GoalRulesConfig,
) -> Option<Decimal> {
    if !goal.is_active() || goal.kind != GoalKind::Savings || !is_allocatable_income(tx, config) {
        return None;
    }
    let ratio = goal.auto_allocate_ratio.filter(|r| *r > Decimal::ZERO)?;
    let amount = (tx.record.amount * ratio).round_dp(2).min(goal.remaining());
    (amount > Decimal::ZERO).then_some(amount)
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory `GoalServices` double for rule tests

    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use crate::error::Result;
    use crate::goals::engine::{GoalServices, RuleExecutionContext};
    use crate::models::*;

    #[derive(Default)]
    pub struct MemoryServices {
        pub goals: Mutex<Vec<Goal>>,
        pub history: Vec<EnrichedTransaction>,
        pub spend: HashMap<String, Decimal>,
        pub progress: Mutex<HashSet<(i64, String)>>,
        pub signals: Mutex<Vec<NewSignal>>,
    }

    impl GoalServices for MemoryServices {
        fn goal_state(&self, _user_id: &str) -> Result<GoalStateSnapshot> {
            Ok(GoalStateSnapshot {
                goals: self.goals.lock().unwrap().clone(),
            })
        }

        fn transactions(&self, query: &TransactionQuery) -> Result<Vec<EnrichedTransaction>> {
            Ok(self
                .history
                .iter()
                .filter(|t| t.user_id == query.user_id)
                .filter(|t| query.category.as_deref().map_or(true, |c| t.categorization.category == c))
                .filter(|t| query.from.map_or(true, |d| t.record.date >= d))
                .filter(|t| query.to.map_or(true, |d| t.record.date <= d))
                .cloned()
                .collect())
        }

        fn category_spend(
            &self,
            _user_id: &str,
            category: &str,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> Result<Decimal> {
            Ok(self.spend.get(category).copied().unwrap_or_default())
        }

        fn record_goal_progress(
            &self,
            goal_id: i64,
            amount: Decimal,
            transaction_key: &str,
        ) -> Result<bool> {
            let fresh = self
                .progress
                .lock()
                .unwrap()
                .insert((goal_id, transaction_key.to_string()));
            if fresh {
                let mut goals = self.goals.lock().unwrap();
                if let Some(goal) = goals.iter_mut().find(|g| g.id == goal_id) {
                    goal.current_amount += amount;
                    if goal.current_amount >= goal.target_amount {
                        goal.status = GoalStatus::Achieved;
                    }
                }
            }
            Ok(fresh)
        }

        fn progress_recorded(&self, goal_id: i64, transaction_key: &str) -> Result<bool> {
            Ok(self
                .progress
                .lock()
                .unwrap()
                .contains(&(goal_id, transaction_key.to_string())))
        }

        fn emit_signal(&self, signal: &NewSignal) -> Result<bool> {
            let mut signals = self.signals.lock().unwrap();
            if signals.iter().any(|s| s.dedup_key == signal.dedup_key) {
                return Ok(false);
            }
            signals.push(signal.clone());
            Ok(true)
        }
    }

    impl MemoryServices {
        pub fn context(&self, tx: &EnrichedTransaction, as_of: NaiveDate) -> RuleExecutionContext {
            RuleExecutionContext {
                user_id: tx.user_id.clone(),
                transaction: tx.clone(),
                goals: self.goal_state(&tx.user_id).unwrap(),
                as_of,
            }
        }
    }

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    pub fn transaction(
        key: &str,
        amount: &str,
        direction: Direction,
        category: &str,
        on: NaiveDate,
    ) -> EnrichedTransaction {
        EnrichedTransaction {
            idempotency_key: key.into(),
            user_id: "u1".into(),
            record: RawTransactionRecord {
                batch_id: "b1".into(),
                row_number: 1,
                date: on,
                amount: dec(amount),
                direction,
                description: format!("{} {}", category.to_uppercase(), key),
                reference: None,
            },
            metadata: TransactionMetadata::default(),
            categorization: CategorizationResult::new(category, None, 0.9, CategorySource::Rule),
            enriched_at: chrono::Utc::now(),
        }
    }

    pub fn savings_goal(id: i64, target: &str, current: &str, ratio: Option<&str>) -> Goal {
        Goal {
            id,
            user_id: "u1".into(),
            name: format!("Goal {}", id),
            kind: GoalKind::Savings,
            target_amount: dec(target),
            current_amount: dec(current),
            category: None,
            start_date: date(2024, 1, 1),
            target_date: Some(date(2024, 12, 31)),
            auto_allocate_ratio: ratio.map(dec),
            status: GoalStatus::Active,
        }
    }

    pub fn spending_cap(id: i64, category: &str, target: &str) -> Goal {
        Goal {
            id,
            user_id: "u1".into(),
            name: format!("{} cap", category),
            kind: GoalKind::SpendingCap,
            target_amount: dec(target),
            current_amount: Decimal::ZERO,
            category: Some(category.into()),
            start_date: date(2024, 1, 1),
            target_date: None,
            auto_allocate_ratio: None,
            status: GoalStatus::Active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_month_bounds() {
        assert_eq!(
            month_bounds(date(2024, 2, 14)).unwrap(),
            (date(2024, 2, 1), date(2024, 2, 29))
        );
        assert_eq!(
            month_bounds(date(2024, 12, 31)).unwrap(),
            (date(2024, 12, 1), date(2024, 12, 31))
        );
    }

    #[test]
    fn test_planned_allocation_caps_at_remaining() {
        let config = GoalRulesConfig::default();
        let salary = transaction("k1", "50000", Direction::Credit, "income", date(2024, 5, 1));

        let goal = savings_goal(1, "100000", "0", Some("0.2"));
        assert_eq!(planned_allocation(&salary, &goal, &config), Some(dec("10000")));

        let nearly_done = savings_goal(2, "100000", "97500", Some("0.2"));
        assert_eq!(planned_allocation(&salary, &nearly_done, &config), Some(dec("2500")));

        let manual = savings_goal(3, "100000", "0", None);
        assert_eq!(planned_allocation(&salary, &manual, &config), None);

        let groceries = transaction("k2", "50000", Direction::Credit, "groceries", date(2024, 5, 1));
        assert_eq!(planned_allocation(&groceries, &goal, &config), None);

        let small = transaction("k3", "500", Direction::Credit, "income", date(2024, 5, 1));
        assert_eq!(planned_allocation(&small, &goal, &config), None);
    }
}
