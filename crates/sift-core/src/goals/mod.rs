//! Goal Rule Engine
//!
//! Reacts to each newly enriched transaction with a priority-ordered set of
//! rules. Each rule sees the transaction plus a fresh snapshot of the user's
//! goals and may emit signals (observations) or suggestions (actions the
//! user can accept or dismiss).
//!
//! ## Built-in rules
//!
//! | Priority | Rule | Emits |
//! |---|---|---|
//! | 10 | `surplus_allocation` | Auto-allocates income into savings goals |
//! | 20 | `goal_drift` | Savings goals behind their straight-line schedule |
//! | 30 | `category_budget` | Spending caps nearing or over their limit |
//! | 40 | `uncategorized_review` | Review suggestions for uncategorized rows |
//! | 50 | `large_expense` | Review suggestions for unusually large debits |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sift_core::goals::{init_goal_rules, GoalRuleEngine};
//!
//! let engine = GoalRuleEngine::new(init_goal_rules(&config.goals), Arc::new(db.clone()));
//! let report = engine.run(&enriched, as_of).await;
//! ```

pub mod dispatch;
pub mod engine;
pub mod rules;

pub use dispatch::GoalDispatcher;
pub use engine::{
    init_goal_rules, GoalRule, GoalRuleEngine, GoalRuleRegistry, GoalServices,
    RuleExecutionContext, RuleRunReport,
};
