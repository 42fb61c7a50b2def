//! Test utilities for sift-core
//!
//! A mock Ollama server answering categorization prompts from a keyword table,
//! for development and integration tests of the HTTP classifier.

use axum::{
    extract::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::sync::oneshot;

/// Mock Ollama server for testing and development
pub struct MockOllamaServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOllamaServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOllamaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Health check
async fn handle_tags() -> Json<TagsResponse> {
    Json(TagsResponse {
        models: vec![ModelInfo {
            name: "llama3.2:latest".to_string(),
            modified_at: "2024-01-01T00:00:00Z".to_string(),
            size: 4_000_000_000,
        }],
    })
}

async fn handle_generate(Json(request): Json<GenerateRequest>) -> Json<GenerateResponse> {
    let description = description_from_prompt(&request.prompt);
    let answer = categorize_mock(&description);

    Json(GenerateResponse {
        model: request.model,
        response: serde_json::to_string(&answer).unwrap(),
        done: true,
    })
}

/// Pull the quoted description out of a categorization prompt
fn description_from_prompt(prompt: &str) -> String {
    prompt
        .split_once("Description: \"")
        .and_then(|(_, rest)| rest.split_once('"'))
        .map(|(description, _)| description.to_string())
        .unwrap_or_default()
}

fn categorize_mock(description: &str) -> CategoryAnswer {
    let d = description.to_lowercase();
    let (category, subcategory, confidence) = if d.contains("netflix") || d.contains("spotify") {
        ("entertainment", Some("streaming"), 0.92)
    } else if d.contains("swiggy") || d.contains("zomato") {
        ("dining", Some("food_delivery"), 0.88)
    } else if d.contains("uber") || d.contains("ola") {
        ("transport", Some("ride_hailing"), 0.85)
    } else if d.contains("pharmacy") || d.contains("apollo") {
        ("health", Some("pharmacy"), 0.8)
    } else if d.contains("crypto") {
        // Outside the taxonomy
        ("crypto_mining", None, 0.95)
    } else if d.contains("kirana") {
        // Low confidence guess
        ("groceries", Some("kirana"), 0.3)
    } else {
        ("uncategorized", None, 0.1)
    };

    CategoryAnswer {
        category: category.to_string(),
        subcategory: subcategory.map(String::from),
        confidence,
    }
}

#[derive(Debug, Serialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Serialize)]
struct ModelInfo {
    name: String,
    modified_at: String,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[allow(dead_code)]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}

#[derive(Debug, Serialize)]
struct CategoryAnswer {
    category: String,
    subcategory: Option<String>,
    confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_from_prompt() {
        let prompt = "Categorize this bank transaction.\nDescription: \"pos netflix com\"\nDirection: debit";
        assert_eq!(description_from_prompt(prompt), "pos netflix com");
        assert_eq!(description_from_prompt("no description here"), "");
    }

    #[test]
    fn test_keyword_answers() {
        assert_eq!(categorize_mock("swiggy order").category, "dining");
        assert_eq!(categorize_mock("crypto exchange").category, "crypto_mining");
        assert_eq!(categorize_mock("something else").category, "uncategorized");
    }
}
