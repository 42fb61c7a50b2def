//! Suggest reviewing transactions nothing could categorize

use async_trait::async_trait;
use serde_json::json;

use crate::error::Result;
use crate::goals::engine::{GoalRule, GoalServices, RuleExecutionContext};
use crate::models::{NewSignal, SignalKind};

use super::draft;

const NAME: &str = "uncategorized_review";

pub struct UncategorizedReviewRule;

impl UncategorizedReviewRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UncategorizedReviewRule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GoalRule for UncategorizedReviewRule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn priority(&self) -> i32 {
        40
    }

    async fn evaluate(
        &self,
        ctx: &RuleExecutionContext,
        _services: &dyn GoalServices,
    ) -> Result<Vec<NewSignal>> {
        let tx = &ctx.transaction;
        if !tx.categorization.is_uncategorized() || tx.categorization.is_override() {
            return Ok(Vec::new());
        }

        let label = tx
            .metadata
            .counterparty
            .as_deref()
            .unwrap_or(&tx.record.description);

        Ok(vec![NewSignal {
            kind: SignalKind::Suggestion,
            message: format!(
                "Pick a category for {} {} on {}",
                tx.record.amount, label, tx.record.date
            ),
            payload: json!({
                "transaction_key": tx.idempotency_key,
                "description": tx.record.description,
                "counterparty": tx.metadata.counterparty,
                "amount": tx.record.amount,
                "direction": tx.record.direction,
                "confidence": tx.categorization.confidence,
            }),
            ..draft(
                ctx,
                NAME,
                "review_uncategorized",
                format!("{}:{}", NAME, tx.idempotency_key),
            )
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goals::rules::testing::*;
    use crate::models::{CategorizationResult, Direction};

    #[tokio::test]
    async fn test_suggests_review_for_uncategorized_only() {
        let services = MemoryServices::default();
        let rule = UncategorizedReviewRule::new();

        let mut tx = transaction("k1", "120", Direction::Debit, "groceries", date(2024, 5, 1));
        let signals = rule
            .evaluate(&services.context(&tx, date(2024, 5, 1)), &services)
            .await
            .unwrap();
        assert!(signals.is_empty());

        tx.categorization = CategorizationResult::uncategorized(0.3);
        let signals = rule
            .evaluate(&services.context(&tx, date(2024, 5, 1)), &services)
            .await
            .unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, SignalKind::Suggestion);
        assert_eq!(signals[0].dedup_key, "uncategorized_review:k1");
        assert_eq!(signals[0].payload["direction"], "debit");
    }
}
