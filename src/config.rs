use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::llm::LLMConfig;
use crate::retriever::RetrieverConfig;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Connection settings shared by both Gemini clients.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub struct Config {
    pub gemini: GeminiConfig,
    pub llm: LLMConfig,
    pub retriever: RetrieverConfig,
    pub server: ServerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let Some(api_key) = get("GEMINI_API_KEY").or_else(|| get("API_KEY")) else {
            bail!("API key not found. Please set the GEMINI_API_KEY environment variable.");
        };

        let request_timeout = Duration::from_secs(parse_or(&get, "REQUEST_TIMEOUT_SECS", 30)?);
        if request_timeout.is_zero() {
            bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }

        let embed_concurrency = parse_or(&get, "EMBED_CONCURRENCY", 1)?;
        if embed_concurrency == 0 {
            bail!("EMBED_CONCURRENCY must be at least 1");
        }

        let llm_defaults = LLMConfig::default();
        let retriever_defaults = RetrieverConfig::default();

        Ok(Config {
            gemini: GeminiConfig {
                api_key: api_key.trim().to_string(),
                base_url: get("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                request_timeout,
            },
            llm: LLMConfig {
                model: get("GEMINI_MODEL").unwrap_or(llm_defaults.model),
                max_tokens: parse_or(&get, "MAX_OUTPUT_TOKENS", llm_defaults.max_tokens)?,
                temperature: parse_or(&get, "TEMPERATURE", llm_defaults.temperature)?,
                top_p: parse_or(&get, "TOP_P", llm_defaults.top_p)?,
            },
            retriever: RetrieverConfig {
                document_path: get("DOCUMENT_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(retriever_defaults.document_path),
                embedding_model: get("EMBEDDING_MODEL")
                    .unwrap_or(retriever_defaults.embedding_model),
                request_timeout,
                embed_concurrency,
                cache_embeddings: parse_or(&get, "CACHE_EMBEDDINGS", false)?,
            },
            server: ServerConfig {
                host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&get, "PORT", 8080)?,
            },
        })
    }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
