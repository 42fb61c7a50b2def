//! Surplus allocation
//!
//! Moves a share of each qualifying income credit into savings goals that
//! opted into auto-allocation. When no goal opted in, suggests a transfer to
//! the savings goal with the nearest deadline instead.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;

use crate::config::GoalRulesConfig;
use crate::error::Result;
use crate::goals::engine::{GoalRule, GoalServices, RuleExecutionContext};
use crate::models::{NewSignal, Severity, SignalKind};

use super::{draft, is_allocatable_income, planned_allocation};

const NAME: &str = "surplus_allocation";

/// Share of the credit suggested when no goal auto-allocates
const SUGGESTED_SHARE: Decimal = Decimal::from_parts(2, 0, 0, false, 1);

pub struct SurplusAllocationRule {
    config: GoalRulesConfig,
}

impl SurplusAllocationRule {
    pub fn new(config: &GoalRulesConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl GoalRule for SurplusAllocationRule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn evaluate(
        &self,
        ctx: &RuleExecutionContext,
        services: &dyn GoalServices,
    ) -> Result<Vec<NewSignal>> {
        let tx = &ctx.transaction;
        if !is_allocatable_income(tx, &self.config) {
            return Ok(Vec::new());
        }

        let mut signals = Vec::new();
        for goal in ctx.goals.savings_goals() {
            let Some(amount) = planned_allocation(tx, goal, &self.config) else {
                continue;
            };

            if services.record_goal_progress(goal.id, amount, &tx.idempotency_key)? {
                tracing::debug!(goal_id = goal.id, %amount, "Surplus allocated");
            }

            signals.push(NewSignal {
                message: format!("Moved {} into {}", amount, goal.name),
                payload: json!({
                    "goal_id": goal.id,
                    "goal_name": goal.name,
                    "amount": amount,
                    "credit_amount": tx.record.amount,
                }),
                ..draft(
                    ctx,
                    NAME,
                    "surplus_allocated",
                    format!("{}:{}:{}", NAME, goal.id, tx.idempotency_key),
                )
            });
        }

        if signals.is_empty() {
            // Nothing auto-allocates; point at the most urgent unfinished goal
            let target = ctx
                .goals
                .savings_goals()
                .filter(|g| g.remaining() > Decimal::ZERO)
                .min_by_key(|g| (g.target_date.is_none(), g.target_date));

            if let Some(goal) = target {
                let amount = (tx.record.amount * SUGGESTED_SHARE)
                    .round_dp(2)
                    .min(goal.remaining());
                signals.push(NewSignal {
                    kind: SignalKind::Suggestion,
                    severity: Severity::Attention,
                    message: format!(
                        "You received {}. Consider moving {} into {}",
                        tx.record.amount, amount, goal.name
                    ),
                    payload: json!({
                        "goal_id": goal.id,
                        "goal_name": goal.name,
                        "suggested_amount": amount,
                        "credit_amount": tx.record.amount,
                    }),
                    ..draft(
                        ctx,
                        NAME,
                        "allocate_surplus",
                        format!("{}:suggest:{}", NAME, tx.idempotency_key),
                    )
                });
            }
        }

        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goals::rules::testing::*;
    use crate::models::{Direction, GoalStatus};

    #[tokio::test]
    async fn test_allocates_income_share_once() {
        let services = MemoryServices::default();
        services
            .goals
            .lock()
            .unwrap()
            .push(savings_goal(1, "100000", "0", Some("0.25")));
        let rule = SurplusAllocationRule::new(&GoalRulesConfig::default());
        let salary = transaction("k1", "40000", Direction::Credit, "income", date(2024, 5, 1));

        let signals = rule
            .evaluate(&services.context(&salary, date(2024, 5, 1)), &services)
            .await
            .unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, "surplus_allocated");
        assert_eq!(services.goals.lock().unwrap()[0].current_amount, dec("10000"));

        // Replay with a fresh snapshot: progress is not added twice
        let signals = rule
            .evaluate(&services.context(&salary, date(2024, 5, 1)), &services)
            .await
            .unwrap();
        assert_eq!(signals[0].dedup_key, "surplus_allocation:1:k1");
        assert_eq!(services.goals.lock().unwrap()[0].current_amount, dec("10000"));
    }

    #[tokio::test]
    async fn test_suggests_when_no_goal_auto_allocates() {
        let services = MemoryServices::default();
        {
            let mut goals = services.goals.lock().unwrap();
            goals.push(savings_goal(1, "100000", "0", None));
            let mut sooner = savings_goal(2, "5000", "1000", None);
            sooner.target_date = Some(date(2024, 6, 30));
            goals.push(sooner);
            let mut done = savings_goal(3, "100", "100", None);
            done.status = GoalStatus::Achieved;
            goals.push(done);
        }
        let rule = SurplusAllocationRule::new(&GoalRulesConfig::default());
        let salary = transaction("k1", "40000", Direction::Credit, "income", date(2024, 5, 1));

        let signals = rule
            .evaluate(&services.context(&salary, date(2024, 5, 1)), &services)
            .await
            .unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, SignalKind::Suggestion);
        assert_eq!(signals[0].payload["goal_id"], 2);
        // 20% of 40000 capped at the 4000 still missing
        assert_eq!(signals[0].payload["suggested_amount"], "4000");
        assert!(services.progress.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ignores_debits_and_small_credits() {
        let services = MemoryServices::default();
        services
            .goals
            .lock()
            .unwrap()
            .push(savings_goal(1, "100000", "0", Some("0.25")));
        let rule = SurplusAllocationRule::new(&GoalRulesConfig::default());

        let debit = transaction("k1", "40000", Direction::Debit, "income", date(2024, 5, 1));
        let small = transaction("k2", "999", Direction::Credit, "income", date(2024, 5, 1));
        for tx in [debit, small] {
            let signals = rule
                .evaluate(&services.context(&tx, date(2024, 5, 1)), &services)
                .await
                .unwrap();
            assert!(signals.is_empty());
        }
    }
}
