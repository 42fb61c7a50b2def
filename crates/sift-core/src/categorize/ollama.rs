//! Ollama classifier backend
//!
//! Asks a local model to pick a category from the taxonomy and answer with a
//! single JSON object.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::classifier::{Classifier, Features, Prediction};
use crate::error::{Error, Result};
use crate::taxonomy::Taxonomy;

/// Confidence assumed when the model leaves it out
const DEFAULT_MODEL_CONFIDENCE: f64 = 0.6;

#[derive(Clone)]
pub struct OllamaClassifier {
    http_client: Client,
    base_url: String,
    model: String,
    /// One line per category: `code: sub1, sub2`
    category_listing: String,
}

impl OllamaClassifier {
    pub fn new(base_url: &str, model: &str, taxonomy: &Taxonomy) -> Self {
        let category_listing = taxonomy
            .categories()
            .map(|c| {
                if c.subcategories.is_empty() {
                    c.code.clone()
                } else {
                    format!("{}: {}", c.code, c.subcategories.join(", "))
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            category_listing,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn host(&self) -> &str {
        &self.base_url
    }

    fn prompt(&self, features: &Features) -> String {
        let mut context = vec![format!("Description: \"{}\"", features.description)];
        if let Some(cp) = &features.counterparty {
            context.push(format!("Counterparty: {}", cp));
        }
        if let Some(channel) = features.channel {
            context.push(format!("Channel: {}", channel));
        }
        if let Some(mcc) = &features.mcc {
            context.push(format!("MCC: {}", mcc));
        }
        context.push(format!("Direction: {}", features.direction));

        format!(
            "Categorize this bank transaction.\n{}\n\nCategories (code: subcategories):\n{}\n\n\
             Respond with JSON only: {{\"category\": \"<code>\", \"subcategory\": \"<code or null>\", \"confidence\": <0..1>}}",
            context.join("\n"),
            self.category_listing
        )
    }

    /// Check if the server is reachable
    pub async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct ModelAnswer {
    category: String,
    #[serde(default)]
    subcategory: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[async_trait]
impl Classifier for OllamaClassifier {
    async fn classify(&self, features: &Features) -> Result<Prediction> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: self.prompt(features),
            stream: false,
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::ClassifierUnavailable(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::ClassifierUnavailable(format!(
                "Ollama returned {}",
                response.status()
            )));
        }

        let ollama_response: OllamaResponse = response.json().await?;
        debug!(response = %ollama_response.response, "Ollama response");

        parse_answer(&ollama_response.response)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Parse the first JSON object in a model response
pub(crate) fn parse_answer(response: &str) -> Result<Prediction> {
    let response = response.trim();
    let json_str = match (response.find('{'), response.rfind('}')) {
        (Some(s), Some(e)) if s < e => &response[s..=e],
        _ => {
            return Err(Error::ClassifierUnavailable(format!(
                "No JSON found in model response: {}",
                truncate(response)
            )))
        }
    };

    let answer: ModelAnswer = serde_json::from_str(json_str).map_err(|e| {
        Error::ClassifierUnavailable(format!(
            "Invalid JSON from model: {} | Raw: {}",
            e,
            truncate(json_str)
        ))
    })?;

    let subcategory = answer
        .subcategory
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty() && s != "null" && s != "none");

    Ok(Prediction {
        category: answer.category.trim().to_lowercase(),
        subcategory,
        confidence: answer
            .confidence
            .unwrap_or(DEFAULT_MODEL_CONFIDENCE)
            .clamp(0.0, 1.0),
    })
}

fn truncate(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use crate::test_utils::MockOllamaServer;

    fn features(description: &str) -> Features {
        Features {
            description: description.into(),
            counterparty: None,
            channel: None,
            mcc: None,
            direction: Direction::Debit,
            amount_bucket: 3,
        }
    }

    #[test]
    fn test_parse_answer_with_chatter() {
        let prediction = parse_answer(
            "Sure! {\"category\": \"Dining\", \"subcategory\": \"null\", \"confidence\": 0.82} hope that helps",
        )
        .unwrap();
        assert_eq!(prediction.category, "dining");
        assert_eq!(prediction.subcategory, None);
        assert_eq!(prediction.confidence, 0.82);
    }

    #[test]
    fn test_parse_answer_defaults_confidence() {
        let prediction = parse_answer(r#"{"category": "groceries"}"#).unwrap();
        assert_eq!(prediction.confidence, DEFAULT_MODEL_CONFIDENCE);
    }

    #[test]
    fn test_parse_answer_without_json() {
        assert!(matches!(
            parse_answer("I cannot help with that"),
            Err(Error::ClassifierUnavailable(_))
        ));
    }

    #[test]
    fn test_prompt_lists_taxonomy() {
        let taxonomy = Taxonomy::embedded().unwrap();
        let classifier = OllamaClassifier::new("http://localhost:11434/", "llama3.2", &taxonomy);
        assert_eq!(classifier.host(), "http://localhost:11434");
        let prompt = classifier.prompt(&features("swiggy order"));
        assert!(prompt.contains("Description: \"swiggy order\""));
        assert!(prompt.contains("dining: restaurant, food_delivery, cafe"));
    }

    #[tokio::test]
    async fn test_classify_against_mock_server() {
        let server = MockOllamaServer::start().await;
        let taxonomy = Taxonomy::embedded().unwrap();
        let classifier = OllamaClassifier::new(&server.url(), "llama3.2", &taxonomy);

        assert!(classifier.health_check().await);
        let prediction = classifier.classify(&features("netflix com")).await.unwrap();
        assert_eq!(prediction.category, "entertainment");
        assert_eq!(prediction.subcategory.as_deref(), Some("streaming"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let taxonomy = Taxonomy::embedded().unwrap();
        let classifier = OllamaClassifier::new("http://127.0.0.1:9", "llama3.2", &taxonomy);
        assert!(matches!(
            classifier.classify(&features("anything")).await,
            Err(Error::ClassifierUnavailable(_))
        ));
    }
}
