use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures_util::{StreamExt, TryStreamExt, stream};
use ndarray::Array1;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::embedding::EmbeddingProvider;
use crate::errors::{EmbedTarget, Result, RetrievalError};
use crate::utils::{content_hash, load_document, normalize_text, split_into_paragraphs};
use crate::vector_db::{Embedding, VectorDB};

#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub document_path: PathBuf,
    pub embedding_model: String,
    /// Upper bound for each embedding call and for reading the document.
    pub request_timeout: Duration,
    /// Embedding calls allowed in flight at once while preparing a document.
    pub embed_concurrency: usize,
    /// Keep the last prepared document and reuse it while its content hash
    /// is unchanged.
    pub cache_embeddings: bool,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            document_path: PathBuf::from("document.txt"),
            embedding_model: "embedding-001".to_string(),
            request_timeout: Duration::from_secs(30),
            embed_concurrency: 1,
            cache_embeddings: false,
        }
    }
}

struct CachedDocument {
    hash: u64,
    db: Arc<VectorDB>,
}

/// Finds the paragraph of one local document closest to a query.
///
/// Without caching, every call re-reads the document and re-embeds every
/// paragraph. Concurrent callers do not share that work.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrieverConfig,
    cache: Mutex<Option<CachedDocument>>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: RetrieverConfig) -> Self {
        Retriever {
            embedder,
            config,
            cache: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Splits `document_text` into paragraphs and embeds each one.
    ///
    /// Chunk contents are the paragraphs exactly as they appear in the
    /// document; only the text sent to the provider is NFC-normalized.
    /// Fails as a whole if any paragraph cannot be embedded. A document with
    /// no paragraphs gives an empty store without calling the provider.
    pub async fn prepare(&self, document_text: &str) -> Result<VectorDB> {
        let paragraphs = split_into_paragraphs(document_text);
        if paragraphs.is_empty() {
            return Ok(VectorDB::default());
        }

        let normalized: Vec<String> = paragraphs.iter().map(|p| normalize_text(p)).collect();
        let calls: Vec<_> = normalized
            .iter()
            .enumerate()
            .map(|(index, text)| self.embed(EmbedTarget::Chunk(index), text))
            .collect();

        // `buffered` yields in input order, so embedding i stays with paragraph i.
        let embeddings: Vec<Embedding> = stream::iter(calls)
            .buffered(self.config.embed_concurrency.max(1))
            .try_collect()
            .await?;

        let dimensions = embeddings[0].len();
        if let Some(index) = embeddings.iter().position(|e| e.len() != dimensions) {
            return Err(RetrievalError::embedding_failed(
                EmbedTarget::Chunk(index),
                anyhow!(
                    "expected {dimensions} dimensions, got {}",
                    embeddings[index].len()
                ),
            ));
        }

        let db = VectorDB::from_parts(paragraphs, embeddings);
        let chars: usize = db.chunks().iter().map(|c| c.content.chars().count()).sum();
        info!(chunks = db.len(), chars, dimensions, "prepared document");
        Ok(db)
    }

    /// Returns the paragraph most similar to `query`.
    ///
    /// Every failure comes back as `RetrievalFailed`; use
    /// [`RetrievalError::cause`] to tell them apart.
    pub async fn answer_with_context(&self, query: &str) -> Result<String> {
        self.retrieve(query)
            .await
            .map_err(RetrievalError::into_retrieval_failed)
    }

    async fn retrieve(&self, query: &str) -> Result<String> {
        let document =
            load_document(&self.config.document_path, self.config.request_timeout).await?;
        let db = self.prepared(&document).await?;
        if db.is_empty() {
            return Err(RetrievalError::NoChunksAvailable);
        }

        let query_embedding = self
            .embed(EmbedTarget::Query, &normalize_text(query))
            .await?;
        if Some(query_embedding.len()) != db.dimensions() {
            return Err(RetrievalError::embedding_failed(
                EmbedTarget::Query,
                anyhow!(
                    "query has {} dimensions but the document has {:?}",
                    query_embedding.len(),
                    db.dimensions()
                ),
            ));
        }

        let chunk = db.most_relevant(&query_embedding)?;
        debug!(index = chunk.index, of = db.len(), "selected most relevant chunk");
        Ok(chunk.content.clone())
    }

    async fn prepared(&self, document_text: &str) -> Result<Arc<VectorDB>> {
        if !self.config.cache_embeddings {
            return Ok(Arc::new(self.prepare(document_text).await?));
        }

        // Keyed on the raw text so cached chunks always match the current document.
        let hash = content_hash(document_text);
        if let Some(cached) = self.cache.lock().await.as_ref().filter(|c| c.hash == hash) {
            debug!(hash, "reusing cached document embeddings");
            return Ok(Arc::clone(&cached.db));
        }

        let db = Arc::new(self.prepare(document_text).await?);
        *self.cache.lock().await = Some(CachedDocument {
            hash,
            db: Arc::clone(&db),
        });
        Ok(db)
    }

    async fn embed(&self, target: EmbedTarget, text: &str) -> Result<Embedding> {
        let timeout = self.config.request_timeout;
        let call = self.embedder.embed(&self.config.embedding_model, text);

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(values)) => Ok(Array1::from(values)),
            Ok(Err(e)) => Err(RetrievalError::embedding_failed(target, e)),
            Err(_) => Err(RetrievalError::embedding_failed(
                target,
                anyhow!("embedding call timed out after {timeout:?}"),
            )),
        }
    }
}
