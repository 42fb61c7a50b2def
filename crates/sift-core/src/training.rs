//! Training data for the naive Bayes classifier
//!
//! Labeled examples come from stored transactions whose category was set by a
//! rule or a user override. Identical feature sets are collapsed to one
//! example, keeping the most confident label (overrides always win).

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::categorize::{Features, NaiveBayesModel, TrainingExample};
use crate::db::Database;
use crate::error::Result;
use crate::models::CategorySource;

/// A training example plus where its label came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledExample {
    #[serde(flatten)]
    pub example: TrainingExample,
    pub source: CategorySource,
    pub confidence: f64,
}

/// Statistics about generated training data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingStats {
    pub total_examples: usize,
    pub from_overrides: usize,
    pub from_rules: usize,
    /// Distinct category/subcategory pairs
    pub labels: usize,
}

impl TrainingStats {
    fn from_examples(examples: &[LabeledExample]) -> Self {
        let labels: BTreeSet<(&str, Option<&str>)> = examples
            .iter()
            .map(|e| {
                (
                    e.example.category.as_str(),
                    e.example.subcategory.as_deref(),
                )
            })
            .collect();
        Self {
            total_examples: examples.len(),
            from_overrides: examples
                .iter()
                .filter(|e| e.source == CategorySource::Override)
                .count(),
            from_rules: examples
                .iter()
                .filter(|e| e.source == CategorySource::Rule)
                .count(),
            labels: labels.len(),
        }
    }
}

pub struct TrainingDataGenerator<'a> {
    db: &'a Database,
}

impl<'a> TrainingDataGenerator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Labeled examples in a stable order
    pub fn generate(&self) -> Result<Vec<LabeledExample>> {
        let examples = self
            .db
            .list_labeled_transactions()?
            .into_iter()
            .map(|tx| LabeledExample {
                example: TrainingExample {
                    tokens: Features::new(&tx.record, &tx.metadata).tokens(),
                    category: tx.categorization.category,
                    subcategory: tx.categorization.subcategory,
                },
                source: tx.categorization.source,
                confidence: tx.categorization.confidence,
            })
            .collect();
        Ok(Self::deduplicate_examples(examples))
    }

    /// Deduplicate by token set, keeping the override or else the highest confidence
    fn deduplicate_examples(examples: Vec<LabeledExample>) -> Vec<LabeledExample> {
        let mut by_input: BTreeMap<String, LabeledExample> = BTreeMap::new();

        for example in examples {
            let key = example.example.tokens.join(" ");
            match by_input.get(&key) {
                Some(existing) if !Self::outranks(&example, existing) => {}
                _ => {
                    by_input.insert(key, example);
                }
            }
        }

        by_input.into_values().collect()
    }

    fn outranks(candidate: &LabeledExample, existing: &LabeledExample) -> bool {
        let rank = |e: &LabeledExample| (e.source == CategorySource::Override, e.confidence);
        let (c_override, c_conf) = rank(candidate);
        let (e_override, e_conf) = rank(existing);
        c_override && !e_override || (c_override == e_override && c_conf > e_conf)
    }

    /// Export one JSON example per line
    pub fn export_jsonl<W: Write>(&self, writer: &mut W) -> Result<TrainingStats> {
        let examples = self.generate()?;
        for example in &examples {
            let json = serde_json::to_string(example)?;
            writeln!(writer, "{}", json)?;
        }
        Ok(TrainingStats::from_examples(&examples))
    }

    /// Train a model from the current database contents
    pub fn train(&self) -> Result<(NaiveBayesModel, TrainingStats)> {
        let examples = self.generate()?;
        let stats = TrainingStats::from_examples(&examples);
        let plain: Vec<TrainingExample> = examples.into_iter().map(|e| e.example).collect();
        let model = NaiveBayesModel::train(&plain);
        tracing::info!(
            examples = stats.total_examples,
            labels = stats.labels,
            overrides = stats.from_overrides,
            "Trained naive Bayes model"
        );
        Ok((model, stats))
    }

    /// Train and write the model as JSON
    pub fn train_and_save(&self, path: &Path) -> Result<TrainingStats> {
        let (model, stats) = self.train()?;
        model.save(path)?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::{Batch, Enricher};
    use crate::models::RawRow;
    use crate::parser::ParseOptions;
    use chrono::NaiveDate;

    fn example(tokens: &[&str], category: &str, source: CategorySource, confidence: f64) -> LabeledExample {
        LabeledExample {
            example: TrainingExample {
                tokens: tokens.iter().map(|t| t.to_string()).collect(),
                category: category.into(),
                subcategory: None,
            },
            source,
            confidence,
        }
    }

    #[test]
    fn test_deduplicate_prefers_override() {
        let examples = vec![
            example(&["cp:amazon"], "shopping", CategorySource::Rule, 0.95),
            example(&["cp:amazon"], "groceries", CategorySource::Override, 1.0),
            example(&["cp:amazon"], "travel", CategorySource::Rule, 0.99),
        ];
        let deduped = TrainingDataGenerator::deduplicate_examples(examples);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].example.category, "groceries");
    }

    #[test]
    fn test_deduplicate_keeps_highest_confidence_rule() {
        let examples = vec![
            example(&["cp:shell"], "shopping", CategorySource::Rule, 0.7),
            example(&["cp:shell"], "transport", CategorySource::Rule, 0.9),
            example(&["cp:bp"], "transport", CategorySource::Rule, 0.9),
        ];
        let deduped = TrainingDataGenerator::deduplicate_examples(examples);
        assert_eq!(deduped.len(), 2);
        assert!(deduped
            .iter()
            .any(|e| e.example.tokens == ["cp:shell"] && e.example.category == "transport"));
    }

    #[tokio::test]
    async fn test_export_and_train_from_database() {
        let db = Database::in_memory().unwrap();
        let enricher = Enricher::with_defaults(db.clone()).unwrap();
        let profile = enricher.profiles().resolve("generic_dr_cr").unwrap();
        let as_of = NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();
        let rows = [
            ["2024-05-01", "NEFT SALARY CREDIT ACME", "85000.00", "CR"],
            ["2024-05-02", "POS STARBUCKS MG ROAD", "350.00", "DR"],
            ["2024-05-03", "POS CORNER SHOP", "120.00", "DR"],
        ]
        .iter()
        .enumerate()
        .map(|(i, cells)| Ok(RawRow::new(i + 1, cells.iter().map(|c| c.to_string()).collect())))
        .collect::<Vec<_>>();

        let report = enricher
            .enrich(&Batch::new("b1", "u1", ParseOptions::new(as_of)), rows, &profile)
            .await
            .unwrap();
        let corner = &report.transactions[2];
        enricher
            .set_override("u1", &corner.idempotency_key, "groceries", Some("kirana"))
            .unwrap();

        let generator = TrainingDataGenerator::new(&db);
        let mut out = Vec::new();
        let stats = generator.export_jsonl(&mut out).unwrap();
        assert_eq!(stats.total_examples, 3);
        assert_eq!(stats.from_overrides, 1);
        assert_eq!(stats.from_rules, 2);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 3);
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert!(first["tokens"].is_array());
        assert!(first["source"].is_string());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        generator.train_and_save(&path).unwrap();
        let model = NaiveBayesModel::load(&path).unwrap();
        assert_eq!(model.label_count(), 3);
        assert_eq!(model.document_count(), 3);
    }
}
