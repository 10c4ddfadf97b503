//! Mock providers and a fake Gemini API shared by the unit tests.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::config::GeminiConfig;
use crate::embedding::EmbeddingProvider;
use crate::llm::{Content, TextGenerator};

const VOCABULARY: &[&str] = &[
    "paris", "france", "berlin", "germany", "rome", "italy", "madrid", "spain", "capital",
];

/// Embeds text as keyword counts over a small fixed vocabulary.
#[derive(Default)]
pub struct KeywordEmbedder {
    calls: Mutex<Vec<(String, String)>>,
    fail_on: Option<&'static str>,
    short_on: Option<&'static str>,
    delay: Option<Duration>,
    staggered: bool,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, marker: &'static str) -> Self {
        self.fail_on = Some(marker);
        self
    }

    pub fn short_vector_on(mut self, marker: &'static str) -> Self {
        self.short_on = Some(marker);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Each call waits 20ms less than the one before it.
    pub fn with_staggered_delay(mut self) -> Self {
        self.staggered = true;
        self
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        VOCABULARY
            .iter()
            .map(|term| words.iter().filter(|w| w == term).count() as f32)
            .collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, text)| text.clone()).collect()
    }

    pub fn models(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(model, _)| model.clone()).collect()
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, model: &str, content: &str) -> Result<Vec<f32>> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((model.to_string(), content.to_string()));
            calls.len() as u64
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.staggered {
            let wait = 100u64.saturating_sub(20 * call_number);
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }

        if self.fail_on.is_some_and(|marker| content.contains(marker)) {
            return Err(anyhow!("provider rejected the request"));
        }

        let mut vector = Self::vector_for(content);
        if self.short_on.is_some_and(|marker| content.contains(marker)) {
            vector.truncate(2);
        }
        Ok(vector)
    }
}

/// Replies `echo: <prompt>`, failing on prompts that contain `FAIL`.
#[derive(Default)]
pub struct ScriptedGenerator {
    seen: Mutex<Vec<(usize, String)>>,
}

impl ScriptedGenerator {
    pub fn echo() -> Self {
        Self::default()
    }

    pub fn history_lengths(&self) -> Vec<usize> {
        self.seen.lock().unwrap().iter().map(|(len, _)| *len).collect()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, history: &[Content], prompt: &str) -> Result<String> {
        self.seen
            .lock()
            .unwrap()
            .push((history.len(), prompt.to_string()));
        if prompt.contains("FAIL") {
            return Err(anyhow!("model unavailable"));
        }
        Ok(format!("echo: {prompt}"))
    }
}

/// Writes `document.txt` into `dir`, replacing any previous content.
pub fn write_document(dir: &TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("document.txt");
    std::fs::write(&path, text).unwrap();
    path
}

pub fn gemini_config(base_url: &str) -> GeminiConfig {
    GeminiConfig {
        api_key: "test-key".to_string(),
        base_url: base_url.to_string(),
        request_timeout: Duration::from_secs(5),
    }
}

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub path: String,
    pub api_key: Option<String>,
    pub body: Value,
}

type Seen = Arc<tokio::sync::Mutex<Vec<SeenRequest>>>;

/// A local stand-in for the Gemini REST API.
///
/// `embedContent` answers `[chars, words, 0]` for the text, or HTTP 500 for
/// `FAIL`. `generateContent` echoes the last turn, or reports a blocked
/// prompt for `BLOCK`.
pub struct FakeGemini {
    pub base_url: String,
    seen: Seen,
}

impl FakeGemini {
    pub async fn start() -> Self {
        let seen = Seen::default();
        let app = Router::new()
            .route("/models/{action}", post(handle_fake_gemini))
            .with_state(seen.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        FakeGemini {
            base_url: format!("http://{addr}"),
            seen,
        }
    }

    pub async fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().await.clone()
    }
}

async fn handle_fake_gemini(
    State(seen): State<Seen>,
    Path(action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    seen.lock().await.push(SeenRequest {
        path: format!("/models/{action}"),
        api_key: headers
            .get("x-goog-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
    });

    if action.ends_with(":embedContent") {
        let text = body["content"]["parts"][0]["text"].as_str().unwrap_or_default();
        if text == "FAIL" {
            let error = json!({ "error": { "code": 500, "message": "backend exploded" } });
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response();
        }
        let values = [
            text.chars().count() as f32,
            text.split_whitespace().count() as f32,
            0.0,
        ];
        return Json(json!({ "embedding": { "values": values } })).into_response();
    }

    if action.ends_with(":generateContent") {
        let last = body["contents"]
            .as_array()
            .and_then(|contents| contents.last())
            .and_then(|turn| turn["parts"][0]["text"].as_str())
            .unwrap_or_default()
            .to_string();
        if last == "BLOCK" {
            return Json(json!({ "promptFeedback": { "blockReason": "SAFETY" } })).into_response();
        }
        return Json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": format!("echo: {last}") }] },
                "finishReason": "STOP"
            }]
        }))
        .into_response();
    }

    StatusCode::NOT_FOUND.into_response()
}
