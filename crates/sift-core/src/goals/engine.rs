//! Goal Rule Engine - runs registered rules against each enriched transaction

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures_util::FutureExt;
use rust_decimal::Decimal;

use crate::config::GoalRulesConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{EnrichedTransaction, GoalStateSnapshot, NewSignal, TransactionQuery};

use super::rules::{
    CategoryBudgetRule, GoalDriftRule, LargeExpenseRule, SurplusAllocationRule,
    UncategorizedReviewRule,
};

/// The operations a goal rule may perform
///
/// Everything a rule reads or writes goes through here, so rules can be
/// exercised against an in-memory double.
pub trait GoalServices: Send + Sync {
    /// Fresh goal state for a user
    fn goal_state(&self, user_id: &str) -> Result<GoalStateSnapshot>;

    /// Transaction history
    fn transactions(&self, query: &TransactionQuery) -> Result<Vec<EnrichedTransaction>>;

    /// Total debits in a category between two dates (inclusive)
    fn category_spend(
        &self,
        user_id: &str,
        category: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Decimal>;

    /// Add progress once per (goal, transaction); false if already recorded
    fn record_goal_progress(
        &self,
        goal_id: i64,
        amount: Decimal,
        transaction_key: &str,
    ) -> Result<bool>;

    /// Whether progress from this transaction was already recorded for the goal
    fn progress_recorded(&self, goal_id: i64, transaction_key: &str) -> Result<bool>;

    /// Persist a signal; false if its dedup key already exists
    fn emit_signal(&self, signal: &NewSignal) -> Result<bool>;

    /// Runtime enable/disable switches keyed by rule name
    fn rule_toggles(&self) -> Result<HashMap<String, bool>> {
        Ok(HashMap::new())
    }
}

impl GoalServices for Database {
    fn goal_state(&self, user_id: &str) -> Result<GoalStateSnapshot> {
        Database::goal_state(self, user_id)
    }

    fn transactions(&self, query: &TransactionQuery) -> Result<Vec<EnrichedTransaction>> {
        self.query_transactions(query)
    }

    fn category_spend(
        &self,
        user_id: &str,
        category: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Decimal> {
        Database::category_spend(self, user_id, category, from, to)
    }

    fn record_goal_progress(
        &self,
        goal_id: i64,
        amount: Decimal,
        transaction_key: &str,
    ) -> Result<bool> {
        Database::record_goal_progress(self, goal_id, amount, transaction_key)
    }

    fn progress_recorded(&self, goal_id: i64, transaction_key: &str) -> Result<bool> {
        self.goal_progress_recorded(goal_id, transaction_key)
    }

    fn emit_signal(&self, signal: &NewSignal) -> Result<bool> {
        self.insert_signal(signal)
    }

    fn rule_toggles(&self) -> Result<HashMap<String, bool>> {
        Database::rule_toggles(self)
    }
}

/// Inputs for one rule invocation; built fresh each time and then dropped
#[derive(Debug, Clone)]
pub struct RuleExecutionContext {
    pub user_id: String,
    pub transaction: EnrichedTransaction,
    /// Goal state read just before this invocation
    pub goals: GoalStateSnapshot,
    pub as_of: NaiveDate,
}

#[async_trait]
pub trait GoalRule: Send + Sync {
    /// Unique rule name; also the key for runtime toggles
    fn name(&self) -> &'static str;

    /// Lower runs earlier
    fn priority(&self) -> i32;

    /// Whether the rule runs when no toggle says otherwise
    fn enabled_by_default(&self) -> bool {
        true
    }

    async fn evaluate(
        &self,
        ctx: &RuleExecutionContext,
        services: &dyn GoalServices,
    ) -> Result<Vec<NewSignal>>;
}

/// Rules in execution order
#[derive(Default)]
pub struct GoalRuleRegistry {
    rules: Vec<Arc<dyn GoalRule>>,
}

impl GoalRuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule; ties on priority keep registration order
    pub fn register(&mut self, rule: Arc<dyn GoalRule>) {
        self.rules.push(rule);
        // sort_by_key is stable
        self.rules.sort_by_key(|r| r.priority());
    }

    pub fn rules(&self) -> &[Arc<dyn GoalRule>] {
        &self.rules
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn GoalRule>> {
        self.rules.iter().find(|r| r.name() == name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Build the registry of built-in rules. Called once by the host at startup.
pub fn init_goal_rules(config: &GoalRulesConfig) -> GoalRuleRegistry {
    let mut registry = GoalRuleRegistry::new();
    registry.register(Arc::new(SurplusAllocationRule::new(config)));
    registry.register(Arc::new(GoalDriftRule::new(config)));
    registry.register(Arc::new(CategoryBudgetRule::new(config)));
    registry.register(Arc::new(UncategorizedReviewRule::new()));
    registry.register(Arc::new(LargeExpenseRule::new(config)));
    registry
}

/// What one engine run over a transaction did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleRunReport {
    pub rules_run: usize,
    pub signals_emitted: usize,
    pub failures: usize,
}

impl RuleRunReport {
    pub fn merge(&mut self, other: RuleRunReport) {
        self.rules_run += other.rules_run;
        self.signals_emitted += other.signals_emitted;
        self.failures += other.failures;
    }
}

/// Runs every enabled rule, in priority order, against one transaction at a time
pub struct GoalRuleEngine {
    registry: GoalRuleRegistry,
    services: Arc<dyn GoalServices>,
}

impl GoalRuleEngine {
    pub fn new(registry: GoalRuleRegistry, services: Arc<dyn GoalServices>) -> Self {
        Self { registry, services }
    }

    pub fn registry(&self) -> &GoalRuleRegistry {
        &self.registry
    }

    /// Run all enabled rules for a transaction
    ///
    /// A failing or panicking rule is logged and counted; the remaining rules
    /// still run.
    pub async fn run(&self, tx: &EnrichedTransaction, as_of: NaiveDate) -> RuleRunReport {
        let mut report = RuleRunReport::default();

        // Toggles are read per transaction so changes apply without a restart
        let toggles = self.services.rule_toggles().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read goal rule toggles, using defaults");
            HashMap::new()
        });

        for rule in self.registry.rules() {
            let enabled = toggles
                .get(rule.name())
                .copied()
                .unwrap_or_else(|| rule.enabled_by_default());
            if !enabled {
                tracing::debug!(rule = rule.name(), "Goal rule disabled");
                continue;
            }

            report.rules_run += 1;
            match self.invoke(rule.as_ref(), tx, as_of).await {
                Ok(signals) => {
                    for signal in signals {
                        match self.services.emit_signal(&signal) {
                            Ok(true) => report.signals_emitted += 1,
                            Ok(false) => tracing::debug!(
                                rule = rule.name(),
                                dedup_key = %signal.dedup_key,
                                "Signal already recorded"
                            ),
                            Err(e) => {
                                tracing::warn!(
                                    rule = rule.name(),
                                    error = %e,
                                    "Failed to persist signal"
                                );
                            }
                        }
                    }
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!(
                        rule = rule.name(),
                        transaction = %tx.idempotency_key,
                        error = %e,
                        "Goal rule failed"
                    );
                }
            }
        }

        report
    }

    async fn invoke(
        &self,
        rule: &dyn GoalRule,
        tx: &EnrichedTransaction,
        as_of: NaiveDate,
    ) -> Result<Vec<NewSignal>> {
        let rule_error = |reason: String| Error::RuleExecution {
            rule: rule.name().to_string(),
            reason,
        };

        let goals = self
            .services
            .goal_state(&tx.user_id)
            .map_err(|e| rule_error(e.to_string()))?;
        let ctx = RuleExecutionContext {
            user_id: tx.user_id.clone(),
            transaction: tx.clone(),
            goals,
            as_of,
        };

        let services: &dyn GoalServices = self.services.as_ref();
        match AssertUnwindSafe(rule.evaluate(&ctx, services))
            .catch_unwind()
            .await
        {
            Ok(Ok(signals)) => Ok(signals),
            Ok(Err(e)) => Err(rule_error(e.to_string())),
            Err(panic) => Err(rule_error(format!("panicked: {}", panic_message(&panic)))),
        }
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
