//! Statement ingestion, recategorization and batch diagnostics

use std::path::Path;

use anyhow::{Context, Result};
use sift_core::models::IngestionSummary;
use sift_core::{Database, Enricher, FormatHint, IngestRequest};

use super::{parse_optional_date, truncate};

/// Arguments of `sift ingest`
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub user: String,
    pub bank: String,
    pub format: String,
    pub period_start: Option<String>,
    pub period_end: Option<String>,
    pub as_of: Option<String>,
}

impl IngestOptions {
    pub fn request(&self) -> Result<IngestRequest> {
        let hint: FormatHint = self.format.parse().map_err(anyhow::Error::msg)?;
        let mut request = IngestRequest::new(self.user.as_str(), self.bank.as_str()).with_format(hint);

        let start = parse_optional_date(self.period_start.as_deref())?;
        let end = parse_optional_date(self.period_end.as_deref())?;
        if let (Some(start), Some(end)) = (start, end) {
            request = request.with_period(start, end);
        }
        if let Some(as_of) = parse_optional_date(self.as_of.as_deref())? {
            request = request.with_as_of(as_of);
        }
        Ok(request)
    }
}

pub async fn cmd_ingest(enricher: &Enricher, file: &Path, options: &IngestOptions) -> Result<()> {
    let request = options.request()?;
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;

    println!("📥 Ingesting {} ({})...", file.display(), request.bank_code);

    let report = enricher
        .ingest_request(&request, &bytes)
        .await
        .with_context(|| format!("Failed to ingest {}", file.display()))?;

    print_summary(&report.summary);
    Ok(())
}

fn print_summary(summary: &IngestionSummary) {
    let by = &summary.rows_categorized_by_source;

    println!();
    println!("📊 Batch {}", &summary.batch_id[..summary.batch_id.len().min(12)]);
    println!("   ─────────────────────────────");
    if let Some(format) = &summary.format {
        println!("   Format:          {}", format);
    }
    println!("   Rows:            {}", summary.rows_total);
    println!("   Parsed:          {}", summary.rows_parsed);
    println!("   Skipped:         {}", summary.rows_skipped);
    println!(
        "   New / updated:   {} / {}",
        summary.inserted, summary.recategorized
    );
    if summary.unchanged > 0 || summary.override_kept > 0 {
        println!(
            "   Unchanged:       {} ({} kept by overrides)",
            summary.unchanged + summary.override_kept,
            summary.override_kept
        );
    }
    println!(
        "   Categorized by:  {} rule, {} model, {} override ({} uncategorized)",
        by.by_rule, by.by_ml, by.by_override, by.uncategorized
    );
    println!("   Goal signals:    {}", summary.signals_emitted);
    if summary.rule_failures > 0 {
        println!("   ⚠️  Goal rule failures: {}", summary.rule_failures);
    }

    if !summary.skipped.is_empty() {
        println!();
        println!("   Skipped rows:");
        for skipped in summary.skipped.iter().take(10) {
            println!(
                "   row {:>5} │ {:<22} │ {}",
                skipped.row_number,
                skipped.reason,
                truncate(&skipped.detail, 60)
            );
        }
        if summary.skipped.len() > 10 {
            println!("   ... and {} more", summary.skipped.len() - 10);
        }
    }
}

pub async fn cmd_recategorize(enricher: &Enricher, user: &str) -> Result<()> {
    println!("🔄 Recategorizing transactions for {}...", user);
    let report = enricher.recategorize_user(user).await?;
    println!(
        "✅ Examined {} transactions, {} changed (overrides untouched)",
        report.examined, report.changed
    );
    Ok(())
}

pub fn cmd_batches(db: &Database, user: &str) -> Result<()> {
    let batches = db.list_batches(user)?;

    if batches.is_empty() {
        println!("No batches yet. Ingest a statement with:");
        println!("  sift ingest --file statement.csv --bank <code>");
        return Ok(());
    }

    println!();
    println!("📦 Ingestion Batches");
    println!("   ─────────────────────────────────────────────────────────────");
    for batch in batches {
        let when = batch
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "   {} │ {:<10} │ {:>5} rows │ {:>4} skipped │ {}",
            &batch.batch_id[..batch.batch_id.len().min(12)],
            batch.bank_code,
            batch.rows_total,
            batch.rows_skipped,
            when
        );
    }
    println!();
    println!("   Use 'sift batches --show <id>' for skipped-row details.");
    Ok(())
}

/// Show one batch; a unique prefix of the batch id is enough
pub fn cmd_batch_show(db: &Database, user: &str, batch_id: &str) -> Result<()> {
    let summary = match db.get_batch_summary(batch_id)? {
        Some(summary) => summary,
        None => {
            let mut matches: Vec<IngestionSummary> = db
                .list_batches(user)?
                .into_iter()
                .filter(|b| b.batch_id.starts_with(batch_id))
                .collect();
            match matches.len() {
                0 => anyhow::bail!("Batch {} not found", batch_id),
                1 => matches.remove(0),
                n => anyhow::bail!("Batch prefix {} is ambiguous ({} matches)", batch_id, n),
            }
        }
    };
    print_summary(&summary);
    Ok(())
}
