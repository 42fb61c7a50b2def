//! Multinomial naive Bayes over feature tokens
//!
//! Trained from overrides and rule-labeled history (see `training`), stored as
//! JSON next to the database.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::classifier::{Classifier, Features, Prediction};
use crate::error::{Error, Result};

const MODEL_VERSION: u32 = 1;

/// Feature tokens every transaction carries; they never identify a merchant
const STRUCTURAL_PREFIXES: [&str; 2] = ["dir:", "amt:"];

/// One labeled training example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub tokens: Vec<String>,
    pub category: String,
    pub subcategory: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LabelStats {
    category: String,
    subcategory: Option<String>,
    documents: u64,
    token_total: u64,
    token_counts: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NaiveBayesModel {
    version: u32,
    documents: u64,
    vocabulary_size: u64,
    labels: Vec<LabelStats>,
}

impl NaiveBayesModel {
    pub fn train(examples: &[TrainingExample]) -> Self {
        let mut labels: Vec<LabelStats> = Vec::new();
        let mut index: HashMap<(String, Option<String>), usize> = HashMap::new();
        let mut vocabulary: HashSet<&str> = HashSet::new();

        for example in examples {
            let key = (example.category.clone(), example.subcategory.clone());
            let slot = *index.entry(key).or_insert_with(|| {
                labels.push(LabelStats {
                    category: example.category.clone(),
                    subcategory: example.subcategory.clone(),
                    ..Default::default()
                });
                labels.len() - 1
            });

            let stats = &mut labels[slot];
            stats.documents += 1;
            for token in &example.tokens {
                *stats.token_counts.entry(token.clone()).or_insert(0) += 1;
                stats.token_total += 1;
                vocabulary.insert(token.as_str());
            }
        }

        Self {
            version: MODEL_VERSION,
            documents: examples.len() as u64,
            vocabulary_size: vocabulary.len() as u64,
            labels,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// A single label leaves nothing to choose between
    pub fn can_discriminate(&self) -> bool {
        self.labels.len() >= 2 && self.documents > 0
    }

    fn knows(&self, token: &str) -> bool {
        self.labels.iter().any(|l| l.token_counts.contains_key(token))
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    pub fn document_count(&self) -> u64 {
        self.documents
    }

    /// Most probable label with its posterior probability.
    ///
    /// `None` when the model cannot discriminate or when none of the
    /// descriptive tokens has been seen in training.
    pub fn predict(&self, tokens: &[String]) -> Option<Prediction> {
        if !self.can_discriminate() {
            return None;
        }
        let has_evidence = tokens
            .iter()
            .filter(|t| !STRUCTURAL_PREFIXES.iter().any(|p| t.starts_with(p)))
            .any(|t| self.knows(t));
        if !has_evidence {
            return None;
        }

        let vocab = self.vocabulary_size.max(1) as f64;
        let scores: Vec<f64> = self
            .labels
            .iter()
            .map(|label| {
                let prior = (label.documents as f64 / self.documents as f64).ln();
                let denominator = label.token_total as f64 + vocab;
                tokens.iter().fold(prior, |acc, token| {
                    let count = label.token_counts.get(token).copied().unwrap_or(0) as f64;
                    // Laplace smoothing
                    acc + ((count + 1.0) / denominator).ln()
                })
            })
            .collect();

        let (best, best_score) = scores
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))?;

        // Posterior of the winner via log-sum-exp
        let normalizer: f64 = scores.iter().map(|s| (s - best_score).exp()).sum();
        let label = &self.labels[best];

        Some(Prediction {
            category: label.category.clone(),
            subcategory: label.subcategory.clone(),
            confidence: 1.0 / normalizer,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let model: Self = serde_json::from_slice(&bytes)?;
        if model.version != MODEL_VERSION {
            return Err(Error::Config(format!(
                "Model {} has version {}, expected {}; retrain with `sift train`",
                path.display(),
                model.version,
                MODEL_VERSION
            )));
        }
        Ok(model)
    }
}

/// Classifier backed by a trained `NaiveBayesModel`
#[derive(Clone)]
pub struct NaiveBayesClassifier {
    model: Arc<NaiveBayesModel>,
}

impl NaiveBayesClassifier {
    pub fn new(model: Arc<NaiveBayesModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Classifier for NaiveBayesClassifier {
    async fn classify(&self, features: &Features) -> Result<Prediction> {
        self.model
            .predict(&features.tokens())
            .ok_or_else(|| {
                Error::ClassifierUnavailable("no known tokens or too few trained labels".into())
            })
    }

    fn name(&self) -> &str {
        "naive_bayes"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(text: &str, category: &str, sub: Option<&str>) -> TrainingExample {
        TrainingExample {
            tokens: text.split_whitespace().map(String::from).collect(),
            category: category.into(),
            subcategory: sub.map(String::from),
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(String::from).collect()
    }

    fn training_set() -> Vec<TrainingExample> {
        vec![
            example("swiggy order dir:debit", "dining", Some("food_delivery")),
            example("zomato order dir:debit", "dining", Some("food_delivery")),
            example("swiggy instamart dir:debit", "dining", Some("food_delivery")),
            example("bigbasket order dir:debit", "groceries", Some("online_grocery")),
            example("dmart store dir:debit", "groceries", None),
            example("acme payroll dir:credit", "income", Some("salary")),
        ]
    }

    #[test]
    fn test_predicts_dominant_label() {
        let model = NaiveBayesModel::train(&training_set());
        assert_eq!(model.label_count(), 4);

        let prediction = model.predict(&tokens("swiggy dir:debit")).unwrap();
        assert_eq!(prediction.category, "dining");
        assert_eq!(prediction.subcategory.as_deref(), Some("food_delivery"));
        assert!(prediction.confidence > 0.5);
        assert!(prediction.confidence <= 1.0);
    }

    #[test]
    fn test_unseen_tokens_predict_nothing() {
        let model = NaiveBayesModel::train(&training_set());
        assert!(model.predict(&tokens("quux zorp")).is_none());
        // Direction and amount tokens alone are not evidence
        assert!(model.predict(&tokens("totallyunknownvendor dir:debit amt:3")).is_none());
        assert!(model.predict(&tokens("totallyunknownvendor swiggy dir:debit")).is_some());
    }

    #[test]
    fn test_skewed_model_does_not_guess_unseen_merchant() {
        let mut examples: Vec<TrainingExample> = (0..9)
            .map(|i| example(&format!("store{} dir:debit", i), "groceries", None))
            .collect();
        examples.push(example("cafe dir:debit", "dining", None));
        let model = NaiveBayesModel::train(&examples);
        assert!(model.predict(&tokens("totallyunknownvendor dir:debit")).is_none());
    }

    #[test]
    fn test_single_label_model_predicts_nothing() {
        let model = NaiveBayesModel::train(&[example("swiggy order dir:debit", "dining", None)]);
        assert!(!model.is_empty());
        assert!(!model.can_discriminate());
        assert!(model.predict(&tokens("swiggy dir:debit")).is_none());
    }

    #[test]
    fn test_empty_model_predicts_nothing() {
        let model = NaiveBayesModel::train(&[]);
        assert!(model.is_empty());
        assert!(model.predict(&tokens("anything")).is_none());
    }

    #[tokio::test]
    async fn test_empty_model_is_unavailable() {
        let classifier = NaiveBayesClassifier::new(Arc::new(NaiveBayesModel::default()));
        let features = Features {
            description: "x".into(),
            counterparty: None,
            channel: None,
            mcc: None,
            direction: crate::models::Direction::Debit,
            amount_bucket: 0,
        };
        assert!(matches!(
            classifier.classify(&features).await,
            Err(Error::ClassifierUnavailable(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json");
        let model = NaiveBayesModel::train(&training_set());
        model.save(&path).unwrap();

        let loaded = NaiveBayesModel::load(&path).unwrap();
        assert_eq!(loaded.document_count(), 6);
        let prediction = loaded.predict(&tokens("payroll dir:credit")).unwrap();
        assert_eq!(prediction.category, "income");
    }
}
