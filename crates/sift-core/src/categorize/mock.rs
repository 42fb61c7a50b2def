//! Mock classifier for testing
//!
//! Keyword-based predictions with no model behind them. Can also be pinned to
//! one answer, made to fail, or made slow to exercise the timeout path.

use std::time::Duration;

use async_trait::async_trait;

use super::classifier::{Classifier, Features, Prediction};
use crate::error::{Error, Result};
use crate::models::UNCATEGORIZED;

#[derive(Debug, Clone)]
enum Behavior {
    Keywords,
    Fixed(Prediction),
    Fail,
}

#[derive(Debug, Clone)]
pub struct MockClassifier {
    behavior: Behavior,
    delay: Option<Duration>,
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClassifier {
    pub fn new() -> Self {
        Self {
            behavior: Behavior::Keywords,
            delay: None,
        }
    }

    /// Always answer with the given prediction
    pub fn fixed(category: &str, subcategory: Option<&str>, confidence: f64) -> Self {
        Self {
            behavior: Behavior::Fixed(Prediction {
                category: category.to_string(),
                subcategory: subcategory.map(String::from),
                confidence,
            }),
            delay: None,
        }
    }

    /// Always fail with `ClassifierUnavailable`
    pub fn failing() -> Self {
        Self {
            behavior: Behavior::Fail,
            delay: None,
        }
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, features: &Features) -> Result<Prediction> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            Behavior::Fixed(prediction) => Ok(prediction.clone()),
            Behavior::Fail => Err(Error::ClassifierUnavailable("mock failure".into())),
            Behavior::Keywords => Ok(keyword_prediction(features)),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

fn keyword_prediction(features: &Features) -> Prediction {
    let text = format!(
        "{} {}",
        features.description,
        features.counterparty.as_deref().unwrap_or_default()
    );

    let (category, subcategory, confidence) = match text.as_str() {
        t if t.contains("netflix") || t.contains("spotify") => {
            ("entertainment", Some("streaming"), 0.9)
        }
        t if t.contains("swiggy") || t.contains("zomato") => ("dining", Some("food_delivery"), 0.9),
        t if t.contains("starbucks") || t.contains("cafe") => ("dining", Some("cafe"), 0.8),
        t if t.contains("amazon") || t.contains("flipkart") => ("shopping", Some("online"), 0.75),
        t if t.contains("uber") || t.contains("ola") => ("transport", Some("ride_hailing"), 0.8),
        t if t.contains("petrol") || t.contains("fuel") || t.contains("shell") => {
            ("transport", Some("fuel"), 0.8)
        }
        t if t.contains("mart") || t.contains("grocery") || t.contains("store") => {
            ("groceries", None, 0.7)
        }
        t if t.contains("salary") || t.contains("payroll") => ("income", Some("salary"), 0.9),
        _ => (UNCATEGORIZED, None, 0.2),
    };

    Prediction {
        category: category.to_string(),
        subcategory: subcategory.map(String::from),
        confidence,
    }
}
