//! JSON HTTP API in front of the model and the document retriever.
//!
//! | Method | Path | Body | Behaviour |
//! |--------|------|------|-----------|
//! | `GET`  | `/` | | Chat page |
//! | `GET`  | `/health` | | Status and version |
//! | `POST` | `/generate_text` | `{"text": ...}` | One-shot generation in a fresh chat |
//! | `POST` | `/chat` | `{"prompt": ...}` | Generation in the shared chat session |
//! | `POST` | `/ask` | `{"prompt": ...}` | Generation grounded in the closest document paragraph |
//!
//! All `POST` routes accept either `prompt` or `text`. Success is
//! `{"response": ...}`; failure is `{"error": ...}` with a 4xx/5xx status.
//! Failures are logged in full but only a generic message is returned.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::llm::{ChatSession, TextGenerator};
use crate::retriever::Retriever;

const INDEX_HTML: &str = include_str!("../static/index.html");

const GENERIC_ERROR: &str = "An internal server error occurred.";
const ASK_APOLOGY: &str = "Sorry, I couldn't find an answer to that right now. Please try again.";

#[derive(Clone)]
pub struct AppState {
    llm: Arc<dyn TextGenerator>,
    retriever: Arc<Retriever>,
    /// The one conversation shared by every `/chat` request.
    chat: Arc<Mutex<ChatSession>>,
}

impl AppState {
    pub fn new(llm: Arc<dyn TextGenerator>, retriever: Arc<Retriever>) -> Self {
        AppState {
            llm,
            retriever,
            chat: Arc::new(Mutex::new(ChatSession::new())),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PromptRequest {
    prompt: Option<String>,
    text: Option<String>,
}

impl PromptRequest {
    fn message(&self) -> Option<&str> {
        [&self.prompt, &self.text]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|m| !m.trim().is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: &'static str) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message,
    }
}

fn internal(message: &'static str) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message,
    }
}

/// Pulls the message out of the body, or the 400 to send instead.
fn require_message(
    payload: Result<Json<PromptRequest>, JsonRejection>,
    missing: &'static str,
) -> Result<String, AppError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(%rejection, "rejected request body");
        bad_request("Invalid JSON body.")
    })?;
    request
        .message()
        .map(str::to_string)
        .ok_or_else(|| bad_request(missing))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        tracing::info_span!(
            "request",
            id = %Uuid::new_v4(),
            method = %request.method(),
            uri = %request.uri(),
        )
    });

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/generate_text", post(handle_generate_text))
        .route("/chat", post(handle_chat))
        .route("/ask", post(handle_ask))
        .layer(cors)
        .layer(trace)
        .with_state(state)
}

/// Serves until the process receives Ctrl-C.
pub async fn run_server(config: &ServerConfig, state: AppState) -> anyhow::Result<()> {
    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on http://{bind_addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "could not listen for shutdown signal");
            }
            info!("shutting down");
        })
        .await?;

    Ok(())
}

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn handle_generate_text(
    State(state): State<AppState>,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, AppError> {
    let text = require_message(payload, "Missing 'text' in request body.")?;

    match state.llm.generate(&[], &text).await {
        Ok(response) => Ok(Json(GenerateResponse { response })),
        Err(e) => {
            error!(error = %format!("{e:#}"), "text generation failed");
            Err(internal(GENERIC_ERROR))
        }
    }
}

async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, AppError> {
    let prompt = require_message(payload, "Missing 'prompt' in request body.")?;

    let mut session = state.chat.lock().await;
    match session.send_message(state.llm.as_ref(), &prompt).await {
        Ok(response) => Ok(Json(GenerateResponse { response })),
        Err(e) => {
            error!(error = %format!("{e:#}"), turns = session.history().len(), "chat turn failed");
            Err(internal(GENERIC_ERROR))
        }
    }
}

async fn handle_ask(
    State(state): State<AppState>,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, AppError> {
    let prompt = require_message(payload, "Missing 'prompt' in request body.")?;

    let context = state
        .retriever
        .answer_with_context(&prompt)
        .await
        .map_err(|e| {
            error!(error = %e, cause = ?e.cause(), "retrieval failed");
            internal(ASK_APOLOGY)
        })?;

    match state.llm.generate_response(&prompt, vec![context]).await {
        Ok(response) => Ok(Json(GenerateResponse { response })),
        Err(e) => {
            error!(error = %format!("{e:#}"), "answer generation failed");
            Err(internal(ASK_APOLOGY))
        }
    }
}
