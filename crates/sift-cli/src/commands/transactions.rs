//! Transaction command implementations (query, override)

use anyhow::Result;
use sift_core::models::{CategorySource, Direction, EnrichedTransaction, TransactionQuery};
use sift_core::{Database, Enricher};

use super::{parse_optional_date, truncate};

/// Filters of `sift transactions`
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub from: Option<String>,
    pub to: Option<String>,
    pub category: Option<String>,
    pub source: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl TransactionFilter {
    pub fn query(&self, user: &str) -> Result<TransactionQuery> {
        let source = self
            .source
            .as_deref()
            .map(|s| s.parse::<CategorySource>())
            .transpose()
            .map_err(anyhow::Error::msg)?;
        Ok(TransactionQuery {
            from: parse_optional_date(self.from.as_deref())?,
            to: parse_optional_date(self.to.as_deref())?,
            category: self.category.as_ref().map(|c| c.to_lowercase()),
            source,
            limit: Some(self.limit),
            offset: Some(self.offset),
            ..TransactionQuery::for_user(user)
        })
    }
}

pub fn cmd_transactions(
    db: &Database,
    user: &str,
    filter: &TransactionFilter,
    json: bool,
) -> Result<()> {
    let transactions = db.query_transactions(&filter.query(user)?)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&transactions)?);
        return Ok(());
    }

    if transactions.is_empty() {
        println!("No transactions found. Ingest some with:");
        println!("  sift ingest --file statement.csv --bank <code>");
        return Ok(());
    }

    println!();
    println!("📝 Transactions");
    println!("   ─────────────────────────────────────────────────────────────");

    for tx in transactions {
        let amount_str = match tx.record.direction {
            Direction::Debit => format!("\x1b[31m-{:.2}\x1b[0m", tx.record.amount),
            Direction::Credit => format!("\x1b[32m+{:.2}\x1b[0m", tx.record.amount),
        };
        let category = match &tx.categorization.subcategory {
            Some(sub) => format!("{}/{}", tx.categorization.category, sub),
            None => tx.categorization.category.clone(),
        };

        println!(
            "   {} │ {} │ {:>20} │ {:<24} │ {:<8} │ {}",
            &tx.idempotency_key[..8],
            tx.record.date,
            amount_str,
            truncate(&category, 24),
            tx.categorization.source,
            truncate(&tx.record.description, 40)
        );
    }

    println!();
    println!("   Use 'sift override <key> <category>' to fix a category.");

    Ok(())
}

/// Find a user's transaction by key or unique key prefix
pub fn resolve_transaction(db: &Database, user: &str, key: &str) -> Result<EnrichedTransaction> {
    if let Some(tx) = db.get_transaction(key)? {
        if tx.user_id == user {
            return Ok(tx);
        }
    }

    let mut matches: Vec<EnrichedTransaction> = db
        .query_transactions(&TransactionQuery::for_user(user))?
        .into_iter()
        .filter(|tx| tx.idempotency_key.starts_with(key))
        .collect();
    match matches.len() {
        0 => anyhow::bail!("Transaction {} not found for user {}", key, user),
        1 => Ok(matches.remove(0)),
        n => anyhow::bail!("Key prefix {} is ambiguous ({} matches)", key, n),
    }
}

pub fn cmd_override(
    enricher: &Enricher,
    user: &str,
    key: &str,
    category: &str,
    subcategory: Option<&str>,
) -> Result<()> {
    let tx = resolve_transaction(enricher.database(), user, key)?;
    let stored = enricher.set_override(user, &tx.idempotency_key, category, subcategory)?;

    println!("✅ Override saved:");
    println!(
        "   {} │ {} │ {}",
        tx.record.date,
        tx.record.amount,
        truncate(&tx.record.description, 40)
    );
    println!(
        "   {} → {}{}",
        tx.categorization.category,
        stored.category,
        stored
            .subcategory
            .as_deref()
            .map(|s| format!("/{}", s))
            .unwrap_or_default()
    );
    println!("   Future transactions like this one will use the same category.");

    Ok(())
}
