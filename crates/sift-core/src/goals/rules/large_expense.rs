//! Large expense
//!
//! Suggests a review for debits at or above the configured threshold, with the
//! category's typical debit over the preceding 90 days for comparison.

use async_trait::async_trait;
use chrono::Duration;
use rust_decimal::Decimal;
use serde_json::json;

use crate::config::GoalRulesConfig;
use crate::error::Result;
use crate::goals::engine::{GoalRule, GoalServices, RuleExecutionContext};
use crate::models::{NewSignal, Severity, SignalKind, TransactionQuery};

use super::draft;

const NAME: &str = "large_expense";

/// History window for the typical-debit comparison
const HISTORY_DAYS: i64 = 90;

pub struct LargeExpenseRule {
    threshold: Decimal,
}

impl LargeExpenseRule {
    pub fn new(config: &GoalRulesConfig) -> Self {
        Self {
            threshold: config.large_expense_threshold,
        }
    }
}

#[async_trait]
impl GoalRule for LargeExpenseRule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn priority(&self) -> i32 {
        50
    }

    async fn evaluate(
        &self,
        ctx: &RuleExecutionContext,
        services: &dyn GoalServices,
    ) -> Result<Vec<NewSignal>> {
        let tx = &ctx.transaction;
        if !tx.is_debit() || tx.record.amount < self.threshold {
            return Ok(Vec::new());
        }

        let category = &tx.categorization.category;
        let history = services.transactions(&TransactionQuery {
            category: Some(category.clone()),
            from: Some(tx.record.date - Duration::days(HISTORY_DAYS)),
            to: Some(tx.record.date),
            ..TransactionQuery::for_user(&ctx.user_id)
        })?;
        let previous: Vec<Decimal> = history
            .iter()
            .filter(|t| t.is_debit() && t.idempotency_key != tx.idempotency_key)
            .map(|t| t.record.amount)
            .collect();
        let typical = (!previous.is_empty()).then(|| {
            (previous.iter().sum::<Decimal>() / Decimal::from(previous.len())).round_dp(2)
        });

        let savings_goals = ctx.goals.savings_goals().count();
        let severity = if tx.record.amount >= self.threshold * Decimal::TWO {
            Severity::Warning
        } else {
            Severity::Attention
        };

        let label = tx
            .metadata
            .counterparty
            .as_deref()
            .unwrap_or(&tx.record.description);
        let mut message = format!(
            "Large {} expense of {} at {}",
            category, tx.record.amount, label
        );
        if let Some(typical) = typical {
            message.push_str(&format!(" (typical {} debit: {})", category, typical));
        }

        Ok(vec![NewSignal {
            kind: SignalKind::Suggestion,
            severity,
            message,
            payload: json!({
                "amount": tx.record.amount,
                "category": category,
                "counterparty": tx.metadata.counterparty,
                "typical_amount": typical,
                "history_count": previous.len(),
                "savings_goals_affected": savings_goals,
            }),
            ..draft(
                ctx,
                NAME,
                "large_expense",
                format!("{}:{}", NAME, tx.idempotency_key),
            )
        }])
    }
}
