//! Pluggable classifier backends for the categorization fallback
//!
//! - `Classifier` trait: one prediction per transaction
//! - `ClassifierClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backends: `NaiveBayesClassifier` (local model), `OllamaClassifier`, `MockClassifier`

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::mock::MockClassifier;
use super::naive_bayes::{NaiveBayesClassifier, NaiveBayesModel};
use super::ollama::OllamaClassifier;
use crate::config::{ClassifierBackend, ClassifierConfig};
use crate::error::Result;
use crate::models::{
    amount_bucket, normalize_key_text, Channel, Direction, RawTransactionRecord,
    TransactionMetadata,
};
use crate::taxonomy::Taxonomy;

/// What a classifier sees of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    /// Normalized description
    pub description: String,
    pub counterparty: Option<String>,
    pub channel: Option<Channel>,
    pub mcc: Option<String>,
    pub direction: Direction,
    pub amount_bucket: u8,
}

impl Features {
    pub fn new(record: &RawTransactionRecord, metadata: &TransactionMetadata) -> Self {
        Self {
            description: normalize_key_text(&record.description),
            counterparty: metadata
                .counterparty
                .as_deref()
                .map(normalize_key_text)
                .filter(|c| !c.is_empty()),
            channel: metadata.channel,
            mcc: metadata.mcc.clone(),
            direction: record.direction,
            amount_bucket: amount_bucket(record.amount),
        }
    }

    /// Bag of words plus tagged structural features
    pub fn tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self
            .description
            .split_whitespace()
            // Long digit runs are references; they never generalize
            .filter(|w| !(w.len() > 4 && w.chars().all(|c| c.is_ascii_digit())))
            .map(String::from)
            .collect();

        if let Some(cp) = &self.counterparty {
            tokens.push(format!("cp:{}", cp));
        }
        if let Some(channel) = self.channel {
            tokens.push(format!("ch:{}", channel.as_str()));
        }
        if let Some(mcc) = &self.mcc {
            tokens.push(format!("mcc:{}", mcc));
        }
        tokens.push(format!("dir:{}", self.direction.as_str()));
        tokens.push(format!("amt:{}", self.amount_bucket));
        tokens
    }
}

/// A classifier's best guess
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub category: String,
    pub subcategory: Option<String>,
    pub confidence: f64,
}

/// Trait defining the interface for all classifier backends
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, features: &Features) -> Result<Prediction>;

    /// Backend name (for logs)
    fn name(&self) -> &str;
}

/// Concrete classifier enum
#[derive(Clone)]
pub enum ClassifierClient {
    NaiveBayes(NaiveBayesClassifier),
    Ollama(OllamaClassifier),
    Mock(MockClassifier),
}

impl ClassifierClient {
    /// Build the configured backend
    ///
    /// Returns None when the backend is `none`, when the naive Bayes model has
    /// not been trained yet, or when Ollama has no host configured.
    pub fn from_config(config: &ClassifierConfig, taxonomy: &Taxonomy) -> Result<Option<Self>> {
        match config.backend {
            ClassifierBackend::NaiveBayes => {
                let Some(path) = config.resolved_model_path() else {
                    return Ok(None);
                };
                if !path.exists() {
                    tracing::debug!(path = %path.display(), "No trained model; classifier disabled");
                    return Ok(None);
                }
                let model = NaiveBayesModel::load(&path)?;
                if !model.can_discriminate() {
                    tracing::debug!(
                        labels = model.label_count(),
                        "Model needs at least two labels; classifier disabled"
                    );
                    return Ok(None);
                }
                Ok(Some(Self::naive_bayes(model)))
            }
            ClassifierBackend::Ollama => match &config.ollama_host {
                Some(host) => Ok(Some(Self::ollama(host, &config.ollama_model, taxonomy))),
                None => {
                    tracing::warn!("Ollama classifier selected but OLLAMA_HOST is not set");
                    Ok(None)
                }
            },
            ClassifierBackend::Mock => Ok(Some(Self::mock())),
            ClassifierBackend::None => Ok(None),
        }
    }

    pub fn naive_bayes(model: NaiveBayesModel) -> Self {
        ClassifierClient::NaiveBayes(NaiveBayesClassifier::new(Arc::new(model)))
    }

    pub fn ollama(host: &str, model: &str, taxonomy: &Taxonomy) -> Self {
        ClassifierClient::Ollama(OllamaClassifier::new(host, model, taxonomy))
    }

    pub fn mock() -> Self {
        ClassifierClient::Mock(MockClassifier::new())
    }
}

#[async_trait]
impl Classifier for ClassifierClient {
    async fn classify(&self, features: &Features) -> Result<Prediction> {
        match self {
            ClassifierClient::NaiveBayes(c) => c.classify(features).await,
            ClassifierClient::Ollama(c) => c.classify(features).await,
            ClassifierClient::Mock(c) => c.classify(features).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            ClassifierClient::NaiveBayes(c) => c.name(),
            ClassifierClient::Ollama(c) => c.name(),
            ClassifierClient::Mock(c) => c.name(),
        }
    }
}
