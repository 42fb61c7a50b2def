//! Goal and goal rule command implementations

use anyhow::{Context, Result};
use chrono::Local;
use rust_decimal::Decimal;
use sift_core::goals::GoalRuleRegistry;
use sift_core::models::{GoalKind, GoalStatus, NewGoal};
use sift_core::{init_goal_rules, ConfigPaths, Database, EngineConfig};

use super::{parse_date_arg, parse_optional_date, truncate};

/// Arguments of `sift goals create`
#[derive(Debug, Clone, Default)]
pub struct GoalSpec {
    pub name: String,
    pub kind: String,
    pub target: String,
    pub category: Option<String>,
    pub start: Option<String>,
    pub by: Option<String>,
    pub auto_allocate: Option<String>,
}

impl GoalSpec {
    pub fn to_new_goal(&self, user: &str) -> Result<NewGoal> {
        let kind: GoalKind = self.kind.parse().map_err(anyhow::Error::msg)?;
        let target_amount: Decimal = self
            .target
            .trim()
            .parse()
            .with_context(|| format!("Invalid target amount '{}'", self.target))?;
        let auto_allocate_ratio = self
            .auto_allocate
            .as_deref()
            .map(|r| {
                r.trim()
                    .parse::<Decimal>()
                    .with_context(|| format!("Invalid auto-allocate ratio '{}'", r))
            })
            .transpose()?;
        let start_date = match &self.start {
            Some(start) => parse_date_arg(start)?,
            None => Local::now().date_naive(),
        };

        Ok(NewGoal {
            user_id: user.to_string(),
            name: self.name.clone(),
            kind,
            target_amount,
            category: self.category.as_ref().map(|c| c.trim().to_lowercase()),
            start_date,
            target_date: parse_optional_date(self.by.as_deref())?,
            auto_allocate_ratio,
        })
    }
}

pub fn cmd_goals_list(db: &Database, user: &str) -> Result<()> {
    let goals = db.list_goals(user)?;

    if goals.is_empty() {
        println!("No goals yet. Create one with:");
        println!("  sift goals create \"Emergency fund\" --target 100000 --by 2025-12-31");
        return Ok(());
    }

    println!();
    println!("🎯 Goals");
    println!("   ─────────────────────────────────────────────────────────────");
    for goal in goals {
        let progress = match goal.kind {
            GoalKind::Savings => format!("{} / {}", goal.current_amount, goal.target_amount),
            GoalKind::SpendingCap => format!(
                "cap {} on {}",
                goal.target_amount,
                goal.category.as_deref().unwrap_or("?")
            ),
        };
        let deadline = goal
            .target_date
            .map(|d| format!("by {}", d))
            .unwrap_or_default();
        println!(
            "   [{}] {:<24} │ {:<12} │ {:<9} │ {:<28} │ {}",
            goal.id,
            truncate(&goal.name, 24),
            goal.kind,
            goal.status.as_str(),
            progress,
            deadline
        );
    }
    Ok(())
}

pub fn cmd_goals_create(db: &Database, user: &str, spec: &GoalSpec) -> Result<()> {
    let goal = spec.to_new_goal(user)?;
    let id = db.create_goal(&goal)?;
    println!("✅ Created goal [{}] {}", id, goal.name);
    Ok(())
}

pub fn cmd_goals_pause(db: &Database, id: i64) -> Result<()> {
    db.set_goal_status(id, GoalStatus::Paused)?;
    println!("⏸  Paused goal {}", id);
    Ok(())
}

pub fn cmd_goals_resume(db: &Database, id: i64) -> Result<()> {
    db.set_goal_status(id, GoalStatus::Active)?;
    println!("▶️  Resumed goal {}", id);
    Ok(())
}

fn registry(paths: &ConfigPaths) -> Result<GoalRuleRegistry> {
    let config = EngineConfig::load(paths.engine.as_deref())?;
    Ok(init_goal_rules(&config.goals))
}

pub fn cmd_goal_rules(db: &Database, paths: &ConfigPaths) -> Result<()> {
    let registry = registry(paths)?;
    let toggles = db.rule_toggles()?;

    println!();
    println!("⚙️  Goal Rules (run in priority order)");
    println!("   ─────────────────────────────────────────────────────────────");
    for rule in registry.rules() {
        let enabled = toggles
            .get(rule.name())
            .copied()
            .unwrap_or_else(|| rule.enabled_by_default());
        println!(
            "   {:>3} │ {:<22} │ {}",
            rule.priority(),
            rule.name(),
            if enabled { "enabled" } else { "disabled" }
        );
    }
    Ok(())
}

pub fn cmd_goal_rule_toggle(
    db: &Database,
    paths: &ConfigPaths,
    rule: &str,
    enabled: bool,
) -> Result<()> {
    let registry = registry(paths)?;
    if registry.get(rule).is_none() {
        anyhow::bail!(
            "Unknown goal rule '{}'. Known rules: {}",
            rule,
            registry.names().join(", ")
        );
    }
    db.set_rule_enabled(rule, enabled)?;
    println!(
        "✅ Goal rule {} {}",
        rule,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}
