use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GeminiConfig;

pub struct LLMConfig {
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-pro-latest".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

/// One conversation turn, in the shape the Gemini API expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Content {
            role: Role::User,
            parts: vec![Part { text: text.into() }],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Content {
            role: Role::Model,
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: ApiError,
}

#[derive(Deserialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<&'a Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            let reason = self
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "unknown".to_string());
            return Err(anyhow!("model returned no candidates (block reason: {reason})"));
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
            return Err(anyhow!("model returned an empty response (finish reason: {reason})"));
        }

        Ok(text)
    }
}

/// Generates text from a prompt and the turns that came before it.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, history: &[Content], prompt: &str) -> Result<String>;

    /// Answers `query` in a fresh conversation, using `context` when given.
    async fn generate_response(&self, query: &str, context: Vec<String>) -> Result<String> {
        if query.trim().is_empty() {
            return Err(anyhow!("Query cannot be empty"));
        }

        let prompt = construct_prompt(query, &context);
        self.generate(&[], &prompt).await
    }
}

pub struct LLM {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    config: LLMConfig,
}

impl LLM {
    pub fn new(gemini: &GeminiConfig, config: LLMConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(gemini.request_timeout)
            .build()
            .context("building HTTP client for text generation")?;

        Ok(LLM {
            client,
            base_url: gemini.base_url.trim_end_matches('/').to_string(),
            api_key: gemini.api_key.clone(),
            config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl TextGenerator for LLM {
    async fn generate(&self, history: &[Content], prompt: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(anyhow!("Prompt cannot be empty"));
        }

        let url = format!(
            "{}/{}:generateContent",
            self.base_url,
            crate::embedding::model_resource(&self.config.model)
        );
        debug!(model = %self.config.model, turns = history.len(), "generating content");

        let turn = Content::user(prompt);
        let body = GenerateContentRequest {
            contents: history.iter().chain(std::iter::once(&turn)).collect(),
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                max_output_tokens: self.config.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("generateContent request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ApiErrorResponse>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_default();
            warn!(%status, %detail, "generateContent rejected");
            return Err(anyhow!("generation API returned HTTP {status}: {detail}"));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .context("parsing generateContent response")?;

        parsed.into_text()
    }
}

/// A single in-memory conversation.
#[derive(Debug, Default)]
pub struct ChatSession {
    history: Vec<Content>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[Content] {
        &self.history
    }

    /// Sends `message` with the history so far. Turns are only recorded when
    /// the model answers.
    pub async fn send_message(&mut self, llm: &dyn TextGenerator, message: &str) -> Result<String> {
        let reply = llm.generate(&self.history, message).await?;
        self.history.push(Content::user(message));
        self.history.push(Content::model(reply.clone()));
        Ok(reply)
    }
}

pub fn construct_prompt(query: &str, context: &[String]) -> String {
    if context.is_empty() {
        return query.to_string();
    }

    format!(
        "Using the following context to answer the question:\n\n{}\n\nQuestion: {query}",
        context.join("\n\n")
    )
}
