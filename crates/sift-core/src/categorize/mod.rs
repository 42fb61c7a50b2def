//! Categorization engine
//!
//! Priority: user override → deterministic rule → classifier → `uncategorized`.
//!
//! The classifier is only consulted when no rule matched. Its answer is kept
//! only if it lands in the taxonomy with at least the configured confidence;
//! errors and timeouts degrade to `uncategorized` with confidence 0.0.

pub mod classifier;
mod mock;
pub mod naive_bayes;
mod ollama;
pub mod rules;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

pub use classifier::{Classifier, ClassifierClient, Features, Prediction};
pub use mock::MockClassifier;
pub use naive_bayes::{NaiveBayesClassifier, NaiveBayesModel, TrainingExample};
pub use ollama::OllamaClassifier;
pub use rules::{CategoryRule, MatchField, PatternType, RuleSet};

use crate::config::ClassifierConfig;
use crate::error::{Error, Result};
use crate::models::{
    CategorizationResult, CategorySource, Override, RawTransactionRecord, TransactionMetadata,
    TransactionSignature, UNCATEGORIZED,
};
use crate::taxonomy::Taxonomy;

/// Lookup of user overrides by transaction signature
pub trait OverrideStore: Send + Sync {
    fn find_override(&self, signature: &TransactionSignature) -> Result<Option<Override>>;
}

pub struct Categorizer {
    rules: RuleSet,
    taxonomy: Arc<Taxonomy>,
    classifier: Option<ClassifierClient>,
    overrides: Option<Arc<dyn OverrideStore>>,
    threshold: f64,
    timeout: Duration,
}

impl Categorizer {
    pub fn new(
        rules: RuleSet,
        taxonomy: Arc<Taxonomy>,
        classifier: Option<ClassifierClient>,
        config: &ClassifierConfig,
    ) -> Self {
        Self {
            rules,
            taxonomy,
            classifier,
            overrides: None,
            threshold: config.threshold,
            timeout: config.timeout,
        }
    }

    pub fn with_overrides(mut self, overrides: Arc<dyn OverrideStore>) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Full cascade for one record
    pub async fn categorize(
        &self,
        user_id: &str,
        record: &RawTransactionRecord,
        metadata: &TransactionMetadata,
    ) -> Result<CategorizationResult> {
        if let Some(store) = &self.overrides {
            let signature = TransactionSignature::new(user_id, record, metadata);
            if let Some(o) = store.find_override(&signature)? {
                debug!(row = record.row_number, category = %o.category, "Override matched");
                return Ok(CategorizationResult::new(
                    o.category,
                    o.subcategory,
                    1.0,
                    CategorySource::Override,
                ));
            }
        }

        Ok(self.categorize_without_override(record, metadata).await)
    }

    /// Rules, then the classifier; never consults overrides
    pub async fn categorize_without_override(
        &self,
        record: &RawTransactionRecord,
        metadata: &TransactionMetadata,
    ) -> CategorizationResult {
        if let Some(rule) = self.rules.first_match(record, metadata) {
            debug!(row = record.row_number, rule = %rule.name, "Rule matched");
            return rule.result();
        }

        let features = Features::new(record, metadata);
        match self.classify(&features).await {
            Ok(result) => result,
            Err(e) => {
                warn!(row = record.row_number, error = %e, "Classifier degraded to uncategorized");
                CategorizationResult::uncategorized(0.0)
            }
        }
    }

    /// Classifier call bounded by the timeout, then threshold and taxonomy checks
    async fn classify(&self, features: &Features) -> Result<CategorizationResult> {
        let Some(classifier) = &self.classifier else {
            return Ok(CategorizationResult::uncategorized(0.0));
        };

        let prediction = tokio::time::timeout(self.timeout, classifier.classify(features))
            .await
            .map_err(|_| {
                Error::ClassifierUnavailable(format!(
                    "{} exceeded {}ms",
                    classifier.name(),
                    self.timeout.as_millis()
                ))
            })?
            .map_err(|e| match e {
                Error::ClassifierUnavailable(_) => e,
                other => Error::ClassifierUnavailable(other.to_string()),
            })?;

        Ok(self.accept(prediction))
    }

    fn accept(&self, prediction: Prediction) -> CategorizationResult {
        let confidence = prediction.confidence;
        if confidence < self.threshold || prediction.category == UNCATEGORIZED {
            return CategorizationResult::uncategorized(confidence);
        }

        let Some(category) = self.taxonomy.get(&prediction.category) else {
            debug!(category = %prediction.category, "Prediction outside taxonomy");
            return CategorizationResult::uncategorized(confidence);
        };

        let subcategory = prediction
            .subcategory
            .filter(|sub| category.has_subcategory(sub));

        CategorizationResult::new(
            prediction.category,
            subcategory,
            confidence,
            CategorySource::Ml,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataExtractor;
    use crate::models::Direction;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryOverrides(Mutex<HashMap<String, Override>>);

    impl MemoryOverrides {
        fn put(&self, signature: &TransactionSignature, category: &str) {
            self.0.lock().unwrap().insert(
                format!("{}|{}", signature.user_id, signature.key()),
                Override {
                    id: 1,
                    user_id: signature.user_id.clone(),
                    signature: signature.key(),
                    category: category.into(),
                    subcategory: None,
                    created_at: Utc::now(),
                },
            );
        }
    }

    impl OverrideStore for MemoryOverrides {
        fn find_override(&self, signature: &TransactionSignature) -> Result<Option<Override>> {
            let key = format!("{}|{}", signature.user_id, signature.key());
            Ok(self.0.lock().unwrap().get(&key).cloned())
        }
    }

    fn record(description: &str) -> RawTransactionRecord {
        RawTransactionRecord {
            batch_id: "b1".into(),
            row_number: 1,
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            amount: Decimal::new(45000, 2),
            direction: Direction::Debit,
            description: description.into(),
            reference: None,
        }
    }

    fn categorizer(classifier: Option<ClassifierClient>, threshold: f64) -> Categorizer {
        let taxonomy = Arc::new(Taxonomy::embedded().unwrap());
        let rules = RuleSet::from_toml_str(
            r#"
            [[rule]]
            name = "johnstore"
            pattern = "JohnStore"
            category = "groceries"
            "#,
            &taxonomy,
        )
        .unwrap();
        let config = ClassifierConfig {
            threshold,
            timeout: Duration::from_millis(50),
            ..Default::default()
        };
        Categorizer::new(rules, taxonomy, classifier, &config)
    }

    async fn run(c: &Categorizer, description: &str) -> CategorizationResult {
        let rec = record(description);
        let meta = MetadataExtractor::default().extract(description);
        c.categorize("u1", &rec, &meta).await.unwrap()
    }

    #[tokio::test]
    async fn test_rule_before_classifier() {
        let c = categorizer(
            Some(ClassifierClient::Mock(MockClassifier::fixed("dining", None, 0.99))),
            0.5,
        );
        let result = run(&c, "UPI/RRN123456789/JohnStore").await;
        assert_eq!(
            result,
            CategorizationResult::new("groceries", None, 0.9, CategorySource::Rule)
        );
    }

    #[tokio::test]
    async fn test_override_wins_over_rule() {
        let overrides = Arc::new(MemoryOverrides::default());
        let rec = record("UPI/RRN123456789/JohnStore");
        let meta = MetadataExtractor::default().extract(&rec.description);
        overrides.put(&TransactionSignature::new("u1", &rec, &meta), "dining");

        let c = categorizer(None, 0.5).with_overrides(overrides);
        let result = c.categorize("u1", &rec, &meta).await.unwrap();
        assert_eq!(result.category, "dining");
        assert_eq!(result.source, CategorySource::Override);
        assert_eq!(result.confidence, 1.0);

        // Other users are unaffected
        let other = c.categorize("u2", &rec, &meta).await.unwrap();
        assert_eq!(other.source, CategorySource::Rule);
    }

    #[tokio::test]
    async fn test_below_threshold_is_uncategorized() {
        let c = categorizer(
            Some(ClassifierClient::Mock(MockClassifier::fixed("dining", None, 0.49))),
            0.5,
        );
        let result = run(&c, "POS SOMEWHERE UNKNOWN").await;
        assert_eq!(result.category, UNCATEGORIZED);
        assert_eq!(result.subcategory, None);
        assert_eq!(result.confidence, 0.49);
        assert_eq!(result.source, CategorySource::Ml);
    }

    #[tokio::test]
    async fn test_confident_prediction_kept() {
        let c = categorizer(
            Some(ClassifierClient::Mock(MockClassifier::fixed(
                "dining",
                Some("fuel"),
                0.8,
            ))),
            0.5,
        );
        let result = run(&c, "POS SOMEWHERE UNKNOWN").await;
        assert_eq!(result.category, "dining");
        // Subcategory outside the category is dropped
        assert_eq!(result.subcategory, None);
        assert_eq!(result.source, CategorySource::Ml);
    }

    #[tokio::test]
    async fn test_prediction_outside_taxonomy() {
        let c = categorizer(
            Some(ClassifierClient::Mock(MockClassifier::fixed("vacations", None, 0.95))),
            0.5,
        );
        assert_eq!(run(&c, "POS SOMEWHERE").await.category, UNCATEGORIZED);
    }

    #[tokio::test]
    async fn test_classifier_failure_degrades() {
        let c = categorizer(Some(ClassifierClient::Mock(MockClassifier::failing())), 0.5);
        let result = run(&c, "POS SOMEWHERE").await;
        assert_eq!(result, CategorizationResult::uncategorized(0.0));
    }

    #[tokio::test]
    async fn test_classifier_timeout_degrades() {
        let slow = MockClassifier::fixed("dining", None, 0.99).with_delay(Duration::from_secs(5));
        let c = categorizer(Some(ClassifierClient::Mock(slow)), 0.5);
        let result = run(&c, "POS SOMEWHERE").await;
        assert_eq!(result, CategorizationResult::uncategorized(0.0));
    }

    #[tokio::test]
    async fn test_no_classifier_is_uncategorized() {
        let c = categorizer(None, 0.5);
        let result = run(&c, "POS SOMEWHERE").await;
        assert_eq!(result.category, UNCATEGORIZED);
        assert_eq!(result.source, CategorySource::Ml);
    }
}
