//! Bank profiles, categorization rules and taxonomy listings

use anyhow::{Context, Result};
use sift_core::{BankProfileRegistry, ConfigPaths, RuleSet, Taxonomy};

use super::truncate;

pub fn cmd_profiles(paths: &ConfigPaths) -> Result<()> {
    let registry =
        BankProfileRegistry::load(paths.banks.as_deref()).context("Failed to load bank profiles")?;

    println!();
    println!("🏦 Bank Profiles");
    println!("   ─────────────────────────────────────────────────────────────");
    for profile in registry.profiles() {
        println!(
            "   {:<14} │ {:<22} │ {}",
            profile.code,
            profile.sign_convention.as_str(),
            truncate(&profile.name, 48)
        );
    }
    println!();
    println!("   Add or replace profiles with --banks <file> or ~/.local/share/sift/banks.toml");
    Ok(())
}

pub fn cmd_rules(paths: &ConfigPaths) -> Result<()> {
    let taxonomy =
        Taxonomy::load(paths.taxonomy.as_deref()).context("Failed to load taxonomy")?;
    let rules = RuleSet::load(paths.rules.as_deref(), &taxonomy)
        .context("Failed to load categorization rules")?;

    println!();
    println!("📋 Categorization Rules ({}, first match wins)", rules.len());
    println!("   ─────────────────────────────────────────────────────────────");
    for rule in rules.rules() {
        let target = match &rule.subcategory {
            Some(sub) => format!("{}/{}", rule.category, sub),
            None => rule.category.clone(),
        };
        println!(
            "   {:<18} │ {:<8} │ {:<28} │ {}",
            truncate(&rule.name, 18),
            rule.pattern_type.as_str(),
            target,
            truncate(&rule.pattern, 40)
        );
    }

    println!();
    println!("🗂  Taxonomy ({} categories)", taxonomy.len());
    println!("   ─────────────────────────────────────────────────────────────");
    for category in taxonomy.categories() {
        println!(
            "   {:<14} │ {}",
            category.code,
            category.subcategories.join(", ")
        );
    }
    Ok(())
}
