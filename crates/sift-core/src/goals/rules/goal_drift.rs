//! Goal drift
//!
//! Compares each dated savings goal's progress with a straight line from its
//! start date to its target date. Progress the surplus rule will record from
//! the current transaction is counted whether or not it has run yet.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;

use crate::config::GoalRulesConfig;
use crate::error::Result;
use crate::goals::engine::{GoalRule, GoalServices, RuleExecutionContext};
use crate::models::{NewSignal, Severity};

use super::{draft, planned_allocation};

const NAME: &str = "goal_drift";

pub struct GoalDriftRule {
    config: GoalRulesConfig,
}

impl GoalDriftRule {
    pub fn new(config: &GoalRulesConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl GoalRule for GoalDriftRule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn priority(&self) -> i32 {
        20
    }

    async fn evaluate(
        &self,
        ctx: &RuleExecutionContext,
        services: &dyn GoalServices,
    ) -> Result<Vec<NewSignal>> {
        let tx = &ctx.transaction;
        let mut signals = Vec::new();

        for goal in ctx.goals.savings_goals() {
            let Some(target_date) = goal.target_date else {
                continue;
            };
            let total_days = (target_date - goal.start_date).num_days();
            if total_days <= 0 || ctx.as_of < goal.start_date {
                continue;
            }

            let pending = match planned_allocation(tx, goal, &self.config) {
                Some(amount) if !services.progress_recorded(goal.id, &tx.idempotency_key)? => {
                    amount
                }
                _ => Decimal::ZERO,
            };
            let saved = goal.current_amount + pending;

            let elapsed = (ctx.as_of - goal.start_date).num_days().min(total_days);
            let expected = elapsed as f64 / total_days as f64;
            let actual = (saved / goal.target_amount).to_f64().unwrap_or(0.0);
            let lag = expected - actual;
            if lag <= self.config.drift_tolerance {
                continue;
            }

            let overdue = ctx.as_of > target_date;
            let severity = if overdue {
                Severity::Alert
            } else if lag > self.config.drift_tolerance * 2.0 {
                Severity::Warning
            } else {
                Severity::Attention
            };
            let expected_amount = goal.target_amount
                * Decimal::from_f64_retain(expected).unwrap_or(Decimal::ONE);

            signals.push(NewSignal {
                severity,
                message: if overdue {
                    format!(
                        "{} passed its target date {} short",
                        goal.name,
                        goal.target_amount - saved
                    )
                } else {
                    format!("{} is {:.0}% behind schedule", goal.name, lag * 100.0)
                },
                payload: json!({
                    "goal_id": goal.id,
                    "goal_name": goal.name,
                    "saved": saved,
                    "expected": expected_amount.round_dp(2),
                    "target": goal.target_amount,
                    "target_date": target_date,
                    "lag": lag,
                }),
                ..draft(
                    ctx,
                    NAME,
                    "goal_drift",
                    format!("{}:{}:{}", NAME, goal.id, ctx.as_of.format("%Y-%m")),
                )
            });
        }

        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goals::rules::testing::*;
    use crate::goals::rules::SurplusAllocationRule;
    use crate::models::Direction;

    #[tokio::test]
    async fn test_flags_lagging_goal_once_per_month() {
        let services = MemoryServices::default();
        // Halfway through the year with 10% saved
        services
            .goals
            .lock()
            .unwrap()
            .push(savings_goal(1, "120000", "12000", None));
        let rule = GoalDriftRule::new(&GoalRulesConfig::default());
        let tx = transaction("k1", "300", Direction::Debit, "dining", date(2024, 7, 1));

        let signals = rule
            .evaluate(&services.context(&tx, date(2024, 7, 1)), &services)
            .await
            .unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].severity, Severity::Warning);
        assert_eq!(signals[0].dedup_key, "goal_drift:1:2024-07");
    }

    #[tokio::test]
    async fn test_on_track_goal_is_quiet() {
        let services = MemoryServices::default();
        services
            .goals
            .lock()
            .unwrap()
            .push(savings_goal(1, "120000", "60000", None));
        let rule = GoalDriftRule::new(&GoalRulesConfig::default());
        let tx = transaction("k1", "300", Direction::Debit, "dining", date(2024, 7, 1));

        let signals = rule
            .evaluate(&services.context(&tx, date(2024, 7, 1)), &services)
            .await
            .unwrap();
        assert!(signals.is_empty());
    }

    /// Drift sees the same state whether surplus allocation ran before or after it
    #[tokio::test]
    async fn test_same_outcome_either_side_of_surplus_allocation() {
        let config = GoalRulesConfig::default();
        let drift = GoalDriftRule::new(&config);
        let surplus = SurplusAllocationRule::new(&config);
        // 35% saved at the halfway mark; the salary share closes the gap
        let salary = transaction("k1", "40000", Direction::Credit, "income", date(2024, 7, 1));
        let as_of = date(2024, 7, 1);

        let drift_first = MemoryServices::default();
        drift_first
            .goals
            .lock()
            .unwrap()
            .push(savings_goal(1, "120000", "42000", Some("0.25")));
        let before = drift
            .evaluate(&drift_first.context(&salary, as_of), &drift_first)
            .await
            .unwrap();
        surplus
            .evaluate(&drift_first.context(&salary, as_of), &drift_first)
            .await
            .unwrap();

        let surplus_first = MemoryServices::default();
        surplus_first
            .goals
            .lock()
            .unwrap()
            .push(savings_goal(1, "120000", "42000", Some("0.25")));
        surplus
            .evaluate(&surplus_first.context(&salary, as_of), &surplus_first)
            .await
            .unwrap();
        let after = drift
            .evaluate(&surplus_first.context(&salary, as_of), &surplus_first)
            .await
            .unwrap();

        assert!(before.is_empty());
        assert!(after.is_empty());
        assert_eq!(
            drift_first.goals.lock().unwrap()[0].current_amount,
            surplus_first.goals.lock().unwrap()[0].current_amount
        );
    }
}
