//! Embedding provider capability and the Gemini `embedContent` client.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GeminiConfig;
use crate::llm::ApiErrorResponse;

/// Turns text into an embedding vector using the named model.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, model: &str, content: &str) -> Result<Vec<f32>>;
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
}

#[derive(Serialize)]
struct EmbedContent<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

/// Accepts both `embedding-001` and `models/embedding-001`.
pub(crate) fn model_resource(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

pub struct GeminiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiEmbedder {
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("building HTTP client for embeddings")?;

        Ok(GeminiEmbedder {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    async fn embed(&self, model: &str, content: &str) -> Result<Vec<f32>> {
        let model = model_resource(model);
        let url = format!("{}/{}:embedContent", self.base_url, model);
        debug!(%model, text_len = content.len(), "requesting embedding");

        let body = EmbedContentRequest {
            model,
            content: EmbedContent {
                parts: [TextPart { text: content }],
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("embedding request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ApiErrorResponse>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_default();
            return Err(anyhow!("embedding API returned HTTP {status}: {detail}"));
        }

        let parsed: EmbedContentResponse = response
            .json()
            .await
            .context("parsing embedding response")?;

        if parsed.embedding.values.is_empty() {
            return Err(anyhow!("embedding API returned an empty vector"));
        }

        Ok(parsed.embedding.values)
    }
}
