//! Enrichment orchestrator
//!
//! Turns a statement into persisted, categorized transactions:
//! extract → parse → metadata → categorize → idempotency key → upsert → goal rules.
//!
//! Rows are processed in statement order. Row-scoped failures become skipped-row
//! diagnostics; anything else aborts the batch, leaving rows already upserted in
//! place. Re-ingesting the same bytes never duplicates a row and never disturbs
//! an override.

use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::categorize::{Categorizer, ClassifierClient, RuleSet};
use crate::config::{ConfigPaths, EngineConfig, ParsingConfig};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::extract::{self, FormatHint};
use crate::goals::{init_goal_rules, GoalRuleEngine};
use crate::metadata::MetadataExtractor;
use crate::models::{EnrichedTransaction, IngestionSummary, Override, RawRow, RawTransactionRecord};
use crate::parser::{skip_diagnostic, ParseOptions, StatementParser};
use crate::profiles::{BankProfile, BankProfileRegistry};
use crate::taxonomy::Taxonomy;

/// One statement upload being enriched
#[derive(Debug, Clone)]
pub struct Batch {
    pub batch_id: String,
    pub user_id: String,
    pub options: ParseOptions,
}

impl Batch {
    pub fn new(batch_id: impl Into<String>, user_id: impl Into<String>, options: ParseOptions) -> Self {
        Self {
            batch_id: batch_id.into(),
            user_id: user_id.into(),
            options,
        }
    }
}

/// Everything one enrichment run produced
#[derive(Debug, Clone, Default)]
pub struct EnrichmentReport {
    /// One entry per parsed row, carrying the categorization now persisted
    pub transactions: Vec<EnrichedTransaction>,
    pub summary: IngestionSummary,
}

/// Parameters for `Enricher::ingest_request`
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub user_id: String,
    pub bank_code: String,
    pub format_hint: FormatHint,
    pub statement_period: Option<(NaiveDate, NaiveDate)>,
    /// "Today" for date plausibility checks; defaults to the local date
    pub as_of: Option<NaiveDate>,
}

impl IngestRequest {
    pub fn new(user_id: impl Into<String>, bank_code: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            bank_code: bank_code.into(),
            format_hint: FormatHint::Auto,
            statement_period: None,
            as_of: None,
        }
    }

    pub fn with_format(mut self, hint: FormatHint) -> Self {
        self.format_hint = hint;
        self
    }

    pub fn with_period(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.statement_period = Some((start, end));
        self
    }

    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }
}

/// Result of re-running categorization over stored transactions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecategorizeReport {
    pub examined: usize,
    pub changed: usize,
}

/// Deterministic batch id: the same user uploading the same bytes for the same bank
pub fn batch_id_for(user_id: &str, bank_code: &str, bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b"|");
    hasher.update(bank_code.trim().to_lowercase().as_bytes());
    hasher.update(b"|");
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Deterministic key for one statement row
pub fn idempotency_key(record: &RawTransactionRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        format!(
            "{}|{}|{}|{}",
            record.batch_id,
            record.row_number,
            record.amount.normalize(),
            record.date
        )
        .as_bytes(),
    );
    hex::encode(hasher.finalize())
}

pub struct Enricher {
    db: Database,
    profiles: Arc<BankProfileRegistry>,
    metadata: MetadataExtractor,
    categorizer: Categorizer,
    goals: Option<Arc<GoalRuleEngine>>,
    parsing: ParsingConfig,
}

impl Enricher {
    pub fn new(
        db: Database,
        profiles: Arc<BankProfileRegistry>,
        metadata: MetadataExtractor,
        categorizer: Categorizer,
        parsing: ParsingConfig,
    ) -> Self {
        Self {
            db,
            profiles,
            metadata,
            categorizer,
            goals: None,
            parsing,
        }
    }

    /// Run the goal rule engine after each upsert
    pub fn with_goals(mut self, engine: Arc<GoalRuleEngine>) -> Self {
        self.goals = Some(engine);
        self
    }

    /// Wire every component from configuration files
    pub fn load(db: Database, paths: &ConfigPaths) -> Result<Self> {
        let config = EngineConfig::load(paths.engine.as_deref())?;
        let taxonomy = Arc::new(Taxonomy::load(paths.taxonomy.as_deref())?);
        let rules = RuleSet::load(paths.rules.as_deref(), &taxonomy)?;
        let profiles = BankProfileRegistry::load(paths.banks.as_deref())?;
        Self::assemble(db, config, taxonomy, rules, profiles)
    }

    /// Embedded defaults only, with the classifier disabled
    pub fn with_defaults(db: Database) -> Result<Self> {
        let mut config = EngineConfig::embedded()?;
        config.classifier.backend = crate::config::ClassifierBackend::None;
        let taxonomy = Arc::new(Taxonomy::embedded()?);
        let rules = RuleSet::embedded(&taxonomy)?;
        let profiles = BankProfileRegistry::embedded()?;
        Self::assemble(db, config, taxonomy, rules, profiles)
    }

    fn assemble(
        db: Database,
        config: EngineConfig,
        taxonomy: Arc<Taxonomy>,
        rules: RuleSet,
        profiles: BankProfileRegistry,
    ) -> Result<Self> {
        let classifier = ClassifierClient::from_config(&config.classifier, &taxonomy)?;
        debug!(
            rules = rules.len(),
            banks = profiles.codes().len(),
            classifier = classifier.is_some(),
            "Enricher configured"
        );

        let categorizer = Categorizer::new(rules, taxonomy, classifier, &config.classifier)
            .with_overrides(Arc::new(db.clone()));
        let goals = GoalRuleEngine::new(init_goal_rules(&config.goals), Arc::new(db.clone()));

        Ok(Self::new(
            db,
            Arc::new(profiles),
            MetadataExtractor::from_config(&config.metadata)?,
            categorizer,
            config.parsing,
        )
        .with_goals(Arc::new(goals)))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn profiles(&self) -> &BankProfileRegistry {
        &self.profiles
    }

    pub fn categorizer(&self) -> &Categorizer {
        &self.categorizer
    }

    pub fn goals(&self) -> Option<&Arc<GoalRuleEngine>> {
        self.goals.as_ref()
    }

    /// Ingest a statement with default options
    pub async fn ingest(
        &self,
        user_id: &str,
        bytes: &[u8],
        bank_code: &str,
        format_hint: FormatHint,
    ) -> Result<EnrichmentReport> {
        let request = IngestRequest::new(user_id, bank_code).with_format(format_hint);
        self.ingest_request(&request, bytes).await
    }

    /// Resolve the profile, extract, enrich and record the batch summary
    pub async fn ingest_request(
        &self,
        request: &IngestRequest,
        bytes: &[u8],
    ) -> Result<EnrichmentReport> {
        let profile = self.profiles.resolve(&request.bank_code)?;
        let batch_id = batch_id_for(&request.user_id, &profile.code, bytes);

        let as_of = request.as_of.unwrap_or_else(|| Local::now().date_naive());
        let mut options = ParseOptions::from_config(&self.parsing, as_of);
        if let Some((start, end)) = request.statement_period {
            options = options.with_period(start, end);
        }

        let rows = extract::extract(bytes, request.format_hint, &profile)?;
        let format = rows.format();

        let batch = Batch::new(batch_id, request.user_id.as_str(), options);
        let mut report = self.enrich(&batch, rows, &profile).await?;
        report.summary.format = Some(format.as_str().to_string());

        self.db.record_batch(&report.summary)?;

        let summary = &report.summary;
        info!(
            batch = %summary.batch_id,
            user = %summary.user_id,
            bank = %summary.bank_code,
            format = %format,
            rows = summary.rows_total,
            parsed = summary.rows_parsed,
            skipped = summary.rows_skipped,
            inserted = summary.inserted,
            signals = summary.signals_emitted,
            "Batch ingested"
        );
        Ok(report)
    }

    /// Enrich already-extracted rows, one at a time and in order
    pub async fn enrich<I>(
        &self,
        batch: &Batch,
        rows: I,
        profile: &BankProfile,
    ) -> Result<EnrichmentReport>
    where
        I: IntoIterator<Item = Result<RawRow>>,
    {
        let parser = StatementParser::new(profile, batch.batch_id.as_str(), batch.options.clone());
        let mut report = EnrichmentReport {
            transactions: Vec::new(),
            summary: IngestionSummary {
                batch_id: batch.batch_id.clone(),
                user_id: batch.user_id.clone(),
                bank_code: profile.code.clone(),
                ..Default::default()
            },
        };

        for row in rows {
            report.summary.rows_total += 1;
            let record = match row.and_then(|row| parser.parse_row(&row)) {
                Ok(record) => record,
                Err(e) => match row_number_of(&e).and_then(|n| skip_diagnostic(n, &e)) {
                    Some(skipped) => {
                        report.summary.skipped.push(skipped);
                        continue;
                    }
                    None => {
                        warn!(batch = %batch.batch_id, error = %e, "Aborting batch");
                        return Err(e);
                    }
                },
            };

            let enriched = self.enrich_record(&batch.user_id, record, &mut report.summary).await?;

            if let Some(engine) = &self.goals {
                let run = engine.run(&enriched, batch.options.as_of).await;
                report.summary.signals_emitted += run.signals_emitted;
                report.summary.rule_failures += run.failures;
            }
            report.transactions.push(enriched);
        }

        report.summary.rows_parsed = report.transactions.len();
        report.summary.rows_skipped = report.summary.skipped.len();
        report.summary.created_at = Some(Utc::now());
        Ok(report)
    }

    /// Metadata, categorization and the compare-and-set upsert for one record
    async fn enrich_record(
        &self,
        user_id: &str,
        record: RawTransactionRecord,
        summary: &mut IngestionSummary,
    ) -> Result<EnrichedTransaction> {
        let metadata = self.metadata.extract(&record.description);
        let categorization = self
            .categorizer
            .categorize(user_id, &record, &metadata)
            .await?;

        let mut enriched = EnrichedTransaction {
            idempotency_key: idempotency_key(&record),
            user_id: user_id.to_string(),
            record,
            metadata,
            categorization,
            enriched_at: Utc::now(),
        };

        let (outcome, persisted) = self.db.upsert_transaction(&enriched)?;
        debug!(
            row = enriched.record.row_number,
            key = %enriched.idempotency_key,
            outcome = ?outcome,
            category = %persisted.category,
            source = %persisted.source,
            "Row enriched"
        );
        enriched.categorization = persisted;
        summary.record_upsert(outcome);
        summary.rows_categorized_by_source.record(&enriched.categorization);
        Ok(enriched)
    }

    /// Re-apply rules and the classifier to every stored non-override transaction
    ///
    /// Goal rules are not re-run; they reacted when the rows were ingested.
    pub async fn recategorize_user(&self, user_id: &str) -> Result<RecategorizeReport> {
        let mut report = RecategorizeReport::default();

        for tx in self.db.list_recategorizable(user_id)? {
            report.examined += 1;
            let metadata = self.metadata.extract(&tx.record.description);
            let result = self
                .categorizer
                .categorize(user_id, &tx.record, &metadata)
                .await?;

            let same = result.category == tx.categorization.category
                && result.subcategory == tx.categorization.subcategory
                && result.source == tx.categorization.source;
            if same {
                continue;
            }
            if self.db.update_categorization(&tx.idempotency_key, &result)? {
                report.changed += 1;
            }
        }

        info!(
            user = user_id,
            examined = report.examined,
            changed = report.changed,
            "Recategorized"
        );
        Ok(report)
    }

    /// Validate against the taxonomy, then override the transaction and its signature
    pub fn set_override(
        &self,
        user_id: &str,
        idempotency_key: &str,
        category: &str,
        subcategory: Option<&str>,
    ) -> Result<Override> {
        let category = category.trim().to_lowercase();
        let subcategory = subcategory
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        self.categorizer
            .taxonomy()
            .validate(&category, subcategory.as_deref())?;
        self.db
            .set_override(user_id, idempotency_key, &category, subcategory.as_deref())
    }
}

/// Row number carried by a row-scoped error
fn row_number_of(error: &Error) -> Option<usize> {
    match error {
        Error::RowParse { row, .. } | Error::AmbiguousDateFormat { row, .. } => Some(*row),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategorySource, SkipReason};

    fn enricher() -> Enricher {
        Enricher::with_defaults(Database::in_memory().unwrap()).unwrap()
    }

    fn batch() -> Batch {
        let as_of = NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();
        Batch::new("batch-1", "u1", ParseOptions::new(as_of))
    }

    fn row(n: usize, cells: &[&str]) -> Result<RawRow> {
        Ok(RawRow::new(n, cells.iter().map(|c| c.to_string()).collect()))
    }

    #[test]
    fn test_batch_id_is_deterministic() {
        let a = batch_id_for("u1", "HDFC", b"rows");
        assert_eq!(a, batch_id_for("u1", " hdfc ", b"rows"));
        assert_ne!(a, batch_id_for("u2", "hdfc", b"rows"));
        assert_ne!(a, batch_id_for("u1", "hdfc", b"rows!"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_idempotency_key_ignores_amount_scale() {
        let record = |amount: &str| RawTransactionRecord {
            batch_id: "b".into(),
            row_number: 3,
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            amount: amount.parse().unwrap(),
            direction: crate::models::Direction::Debit,
            description: "x".into(),
            reference: None,
        };
        assert_eq!(idempotency_key(&record("450.00")), idempotency_key(&record("450")));
        assert_ne!(idempotency_key(&record("450")), idempotency_key(&record("450.01")));
    }

    #[tokio::test]
    async fn test_enrich_counts_and_skips() {
        let enricher = enricher();
        let profile = enricher.profiles().resolve("generic_dr_cr").unwrap();
        let rows = vec![
            row(1, &["2024-05-01", "NEFT SALARY CREDIT ACME", "85000.00", "CR"]),
            row(2, &["2024-13-45", "POS SOMEWHERE", "10.00", "DR"]),
            row(3, &["2024-05-03", "UPI/RRN123456789/UnknownShop", "450.00", "DR"]),
            Err(Error::RowParse {
                row: 4,
                reason: "unreadable line".into(),
            }),
        ];

        let report = enricher.enrich(&batch(), rows, &profile).await.unwrap();
        let summary = &report.summary;

        assert_eq!(summary.rows_total, 4);
        assert_eq!(summary.rows_parsed, 2);
        assert_eq!(summary.rows_skipped, 2);
        assert_eq!(summary.skipped_with(SkipReason::AmbiguousDateFormat), 1);
        assert_eq!(summary.skipped_with(SkipReason::RowParseError), 1);
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.rows_categorized_by_source.by_rule, 1);
        assert_eq!(summary.rows_categorized_by_source.uncategorized, 1);

        let salary = &report.transactions[0];
        assert_eq!(salary.categorization.category, "income");
        assert_eq!(salary.categorization.source, CategorySource::Rule);
        assert!(enricher
            .database()
            .get_transaction(&salary.idempotency_key)
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_fatal_error_keeps_earlier_rows() {
        let enricher = enricher();
        let profile = enricher.profiles().resolve("generic_dr_cr").unwrap();
        let rows = vec![
            row(1, &["2024-05-01", "POS CORNER SHOP", "120.00", "DR"]),
            Err(Error::Io(std::io::Error::other("truncated upload"))),
            row(3, &["2024-05-02", "POS CORNER SHOP", "80.00", "DR"]),
        ];

        let result = enricher.enrich(&batch(), rows, &profile).await;
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(enricher.database().count_transactions("u1").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_set_override_validates_taxonomy() {
        let enricher = enricher();
        let profile = enricher.profiles().resolve("generic_dr_cr").unwrap();
        let report = enricher
            .enrich(
                &batch(),
                vec![row(1, &["2024-05-01", "POS CORNER SHOP", "120.00", "DR"])],
                &profile,
            )
            .await
            .unwrap();
        let key = &report.transactions[0].idempotency_key;

        assert!(enricher.set_override("u1", key, "not-a-category", None).is_err());

        let stored = enricher
            .set_override("u1", key, " Groceries ", Some("Supermarket"))
            .unwrap();
        assert_eq!(stored.category, "groceries");
        assert_eq!(stored.subcategory.as_deref(), Some("supermarket"));
    }
}
