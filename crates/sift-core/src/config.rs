//! Engine configuration
//!
//! Every configuration file is resolved in two layers:
//! 1. An explicit path, or the override in the data dir (~/.local/share/sift/<file>)
//! 2. The embedded default compiled into the binary (`config/` at the workspace root)
//!
//! Environment variables win over both for the classifier backend:
//! `SIFT_CLASSIFIER`, `OLLAMA_HOST`, `OLLAMA_MODEL`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default engine config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/sift.toml");

pub const CONFIG_FILE: &str = "sift.toml";

/// Sift's directory under the platform data dir
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("sift"))
}

/// Read the user's copy of a config file: the explicit path, else the data dir override
pub(crate) fn read_override(explicit: Option<&Path>, file_name: &str) -> Result<Option<String>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match data_dir().map(|d| d.join(file_name)) {
            Some(path) if path.exists() => path,
            _ => return Ok(None),
        },
    };

    tracing::debug!(path = %path.display(), "Using config override");
    fs::read_to_string(&path)
        .map(Some)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))
}

/// Read a config file: explicit path, then data dir override, then the embedded default
pub(crate) fn read_layered(
    explicit: Option<&Path>,
    file_name: &str,
    embedded: &'static str,
) -> Result<String> {
    Ok(read_override(explicit, file_name)?.unwrap_or_else(|| embedded.to_string()))
}

/// Which classifier backs the categorization fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierBackend {
    /// Local naive Bayes model trained from overrides and rule-labeled history
    NaiveBayes,
    /// Ollama HTTP API
    Ollama,
    /// Deterministic keyword mock (tests, demos)
    Mock,
    /// No classifier: rule misses go straight to `uncategorized`
    None,
}

impl ClassifierBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NaiveBayes => "naive_bayes",
            Self::Ollama => "ollama",
            Self::Mock => "mock",
            Self::None => "none",
        }
    }
}

impl std::str::FromStr for ClassifierBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "naive_bayes" | "bayes" | "local" => Ok(Self::NaiveBayes),
            "ollama" => Ok(Self::Ollama),
            "mock" => Ok(Self::Mock),
            "none" | "off" => Ok(Self::None),
            _ => Err(format!("Unknown classifier backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub backend: ClassifierBackend,
    /// Predictions below this confidence become `uncategorized`
    pub threshold: f64,
    /// Upper bound for one classifier call
    pub timeout: Duration,
    /// Naive Bayes model file; defaults to `<data_dir>/model.json`
    pub model_path: Option<PathBuf>,
    pub ollama_host: Option<String>,
    pub ollama_model: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: ClassifierBackend::NaiveBayes,
            threshold: 0.5,
            timeout: Duration::from_millis(300),
            model_path: None,
            ollama_host: None,
            ollama_model: "llama3.2".to_string(),
        }
    }
}

impl ClassifierConfig {
    pub fn resolved_model_path(&self) -> Option<PathBuf> {
        self.model_path
            .clone()
            .or_else(|| data_dir().map(|d| d.join("model.json")))
    }
}

/// Plausible-date window used by the statement parser
#[derive(Debug, Clone)]
pub struct ParsingConfig {
    /// Days a row may fall outside the statement period (or after "today")
    pub grace_days: i64,
    /// How far back a row may be dated when the statement period is unknown
    pub max_history_days: i64,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            grace_days: 7,
            max_history_days: 3660,
        }
    }
}

/// Thresholds for the built-in goal rules
#[derive(Debug, Clone)]
pub struct GoalRulesConfig {
    /// Categories whose credits count as income for surplus allocation
    pub income_categories: Vec<String>,
    /// Smallest credit considered for surplus allocation
    pub min_surplus: Decimal,
    /// Fraction of expected progress a savings goal may lag before drifting
    pub drift_tolerance: f64,
    /// Fraction of a spending cap that raises an attention signal
    pub budget_attention_ratio: f64,
    /// Debits at or above this amount raise a large-expense suggestion
    pub large_expense_threshold: Decimal,
}

impl Default for GoalRulesConfig {
    fn default() -> Self {
        Self {
            income_categories: vec!["income".to_string()],
            min_surplus: Decimal::from(1000),
            drift_tolerance: 0.1,
            budget_attention_ratio: 0.8,
            large_expense_threshold: Decimal::from(25_000),
        }
    }
}

/// Description mining knobs
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    /// Prefixes a reference number may follow, most specific first
    pub reference_prefixes: Vec<String>,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            reference_prefixes: ["UPI/", "IMPS/", "NEFT/", "RTGS/", "REF", "RRN", "UTR", "TXN"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Explicit locations for each config file; `None` falls back to the data dir, then the default
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    pub engine: Option<PathBuf>,
    pub banks: Option<PathBuf>,
    pub rules: Option<PathBuf>,
    pub taxonomy: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub classifier: ClassifierConfig,
    pub parsing: ParsingConfig,
    pub metadata: MetadataConfig,
    pub goals: GoalRulesConfig,
}

impl EngineConfig {
    /// Load from `explicit`, the data dir override, or the embedded default, then apply env
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let content = read_layered(explicit, CONFIG_FILE, DEFAULT_CONFIG)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Embedded defaults only (no files, no env)
    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid sift.toml: {}", e)))?;

        let mut config = EngineConfig::default();

        if let Some(c) = raw.classifier {
            if let Some(backend) = c.backend {
                config.classifier.backend = backend.parse().map_err(Error::Config)?;
            }
            if let Some(threshold) = c.threshold {
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(Error::Config(format!(
                        "classifier.threshold must be within 0..1, got {}",
                        threshold
                    )));
                }
                config.classifier.threshold = threshold;
            }
            if let Some(ms) = c.timeout_ms {
                config.classifier.timeout = Duration::from_millis(ms);
            }
            config.classifier.model_path = c.model_path.map(PathBuf::from);
            config.classifier.ollama_host = c.ollama_host;
            if let Some(model) = c.ollama_model {
                config.classifier.ollama_model = model;
            }
        }

        if let Some(p) = raw.parsing {
            if let Some(grace) = p.grace_days {
                config.parsing.grace_days = bounded_days("parsing.grace_days", grace, 0, 366)?;
            }
            if let Some(history) = p.max_history_days {
                config.parsing.max_history_days =
                    bounded_days("parsing.max_history_days", history, 1, 36_500)?;
            }
        }

        if let Some(m) = raw.metadata {
            if let Some(prefixes) = m.reference_prefixes {
                if prefixes.iter().any(|p| p.trim().is_empty()) {
                    return Err(Error::Config(
                        "metadata.reference_prefixes must not contain empty strings".into(),
                    ));
                }
                config.metadata.reference_prefixes = prefixes;
            }
        }

        if let Some(g) = raw.goals {
            if let Some(categories) = g.income_categories {
                config.goals.income_categories = categories;
            }
            if let Some(min) = g.min_surplus {
                config.goals.min_surplus = min;
            }
            if let Some(tolerance) = g.drift_tolerance {
                config.goals.drift_tolerance = tolerance;
            }
            if let Some(ratio) = g.budget_attention_ratio {
                config.goals.budget_attention_ratio = ratio;
            }
            if let Some(threshold) = g.large_expense_threshold {
                config.goals.large_expense_threshold = threshold;
            }
        }

        Ok(config)
    }

    /// Apply environment overrides for the classifier backend
    pub fn apply_env(&mut self) {
        if let Ok(backend) = std::env::var("SIFT_CLASSIFIER") {
            match backend.parse() {
                Ok(b) => self.classifier.backend = b,
                Err(e) => tracing::warn!(error = %e, "Ignoring SIFT_CLASSIFIER"),
            }
        }
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            self.classifier.ollama_host = Some(host);
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            self.classifier.ollama_model = model;
        }
    }
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    classifier: Option<RawClassifier>,
    parsing: Option<RawParsing>,
    metadata: Option<RawMetadata>,
    goals: Option<RawGoals>,
}

#[derive(Debug, Deserialize)]
struct RawClassifier {
    backend: Option<String>,
    threshold: Option<f64>,
    timeout_ms: Option<u64>,
    model_path: Option<String>,
    ollama_host: Option<String>,
    ollama_model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawParsing {
    grace_days: Option<i64>,
    max_history_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    reference_prefixes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawGoals {
    income_categories: Option<Vec<String>>,
    min_surplus: Option<Decimal>,
    drift_tolerance: Option<f64>,
    budget_attention_ratio: Option<f64>,
    large_expense_threshold: Option<Decimal>,
}

fn bounded_days(key: &str, value: i64, min: i64, max: i64) -> Result<i64> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(Error::Config(format!(
            "{} must be within {}..={} days, got {}",
            key, min, max, value
        )))
    }
}
