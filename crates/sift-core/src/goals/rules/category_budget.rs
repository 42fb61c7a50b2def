//! Category budget
//!
//! Checks month-to-date spend in a debit's category against the user's
//! spending caps for that category.

use async_trait::async_trait;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde_json::json;

use crate::config::GoalRulesConfig;
use crate::error::Result;
use crate::goals::engine::{GoalRule, GoalServices, RuleExecutionContext};
use crate::models::{NewSignal, Severity};

use super::{draft, month_bounds};

const NAME: &str = "category_budget";

pub struct CategoryBudgetRule {
    attention_ratio: Decimal,
}

impl CategoryBudgetRule {
    pub fn new(config: &GoalRulesConfig) -> Self {
        Self {
            attention_ratio: Decimal::from_f64(config.budget_attention_ratio)
                .unwrap_or(Decimal::ONE),
        }
    }
}

#[async_trait]
impl GoalRule for CategoryBudgetRule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn priority(&self) -> i32 {
        30
    }

    async fn evaluate(
        &self,
        ctx: &RuleExecutionContext,
        services: &dyn GoalServices,
    ) -> Result<Vec<NewSignal>> {
        let tx = &ctx.transaction;
        if !tx.is_debit() || tx.categorization.is_uncategorized() {
            return Ok(Vec::new());
        }

        let category = &tx.categorization.category;
        let (from, to) = month_bounds(tx.record.date)?;
        let month = tx.record.date.format("%Y-%m").to_string();
        let mut signals = Vec::new();

        for cap in ctx.goals.caps_for(category) {
            let spent = services.category_spend(&ctx.user_id, category, from, to)?;

            let (level, severity, message) = if spent > cap.target_amount {
                (
                    "exceeded",
                    Severity::Alert,
                    format!(
                        "{} spending is {} over the {} cap this month",
                        category,
                        spent - cap.target_amount,
                        cap.target_amount
                    ),
                )
            } else if spent >= cap.target_amount * self.attention_ratio {
                (
                    "attention",
                    Severity::Attention,
                    format!(
                        "{} of the {} {} cap used this month",
                        spent, cap.target_amount, category
                    ),
                )
            } else {
                continue;
            };

            signals.push(NewSignal {
                severity,
                message,
                payload: json!({
                    "goal_id": cap.id,
                    "category": category,
                    "month": month,
                    "spent": spent,
                    "cap": cap.target_amount,
                    "used": (spent / cap.target_amount).to_f64(),
                }),
                ..draft(
                    ctx,
                    NAME,
                    &format!("budget_{}", level),
                    format!("{}:{}:{}:{}", NAME, cap.id, month, level),
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
    use crate::models::Direction;

    fn services_with(spent: &str) -> MemoryServices {
        let mut services = MemoryServices::default();
        services.spend.insert("dining".into(), dec(spent));
        services
            .goals
            .lock()
            .unwrap()
            .push(spending_cap(7, "dining", "5000"));
        services
    }

    async fn run(services: &MemoryServices, tx: &crate::models::EnrichedTransaction) -> Vec<NewSignal> {
        CategoryBudgetRule::new(&GoalRulesConfig::default())
            .evaluate(&services.context(tx, tx.record.date), services)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_levels() {
        let tx = transaction("k1", "300", Direction::Debit, "dining", date(2024, 5, 20));

        assert!(run(&services_with("3000"), &tx).await.is_empty());

        let attention = run(&services_with("4200"), &tx).await;
        assert_eq!(attention.len(), 1);
        assert_eq!(attention[0].signal_type, "budget_attention");
        assert_eq!(attention[0].dedup_key, "category_budget:7:2024-05:attention");

        let exceeded = run(&services_with("5300"), &tx).await;
        assert_eq!(exceeded[0].signal_type, "budget_exceeded");
        assert_eq!(exceeded[0].severity, Severity::Alert);
    }

    #[tokio::test]
    async fn test_other_categories_and_credits_ignored() {
        let services = services_with("9000");
        let groceries = transaction("k1", "300", Direction::Debit, "groceries", date(2024, 5, 20));
        let refund = transaction("k2", "300", Direction::Credit, "dining", date(2024, 5, 20));
        assert!(run(&services, &groceries).await.is_empty());
        assert!(run(&services, &refund).await.is_empty());
    }
}
