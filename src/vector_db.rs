use ndarray::Array1;

use crate::errors::{Result, RetrievalError};

pub type Embedding = Array1<f32>;

#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: usize,
    pub content: String,
    pub embedding: Embedding,
}

/// Paragraph chunks of one document, in split order, each with its embedding.
#[derive(Debug, Clone, Default)]
pub struct VectorDB {
    chunks: Vec<Chunk>,
}

impl VectorDB {
    /// Pairs contents with embeddings positionally.
    ///
    /// Callers must pass equally long sequences; this is checked in debug builds.
    pub fn from_parts(contents: Vec<String>, embeddings: Vec<Embedding>) -> Self {
        debug_assert_eq!(contents.len(), embeddings.len());
        let chunks = contents
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (content, embedding))| Chunk {
                index,
                content,
                embedding,
            })
            .collect();
        VectorDB { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Dimensionality shared by the stored embeddings, if any are stored.
    pub fn dimensions(&self) -> Option<usize> {
        self.chunks.first().map(|chunk| chunk.embedding.len())
    }

    pub fn most_relevant(&self, query: &Embedding) -> Result<&Chunk> {
        let index = find_most_relevant(query, self.chunks.iter().map(|c| &c.embedding))?;
        Ok(&self.chunks[index])
    }
}

/// Cosine similarity, or 0.0 when it is undefined (zero magnitude, length
/// mismatch, non-finite input).
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product = a.dot(b);
    let norm_a = (a.dot(a)).sqrt();
    let norm_b = (b.dot(b)).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (norm_a * norm_b);
    if similarity.is_finite() { similarity } else { 0.0 }
}

/// Index of the embedding most similar to `query`. Ties go to the lowest index.
pub fn find_most_relevant<'a, I>(query: &Embedding, embeddings: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a Embedding>,
{
    let mut best: Option<(usize, f32)> = None;

    for (index, embedding) in embeddings.into_iter().enumerate() {
        let similarity = cosine_similarity(query, embedding);
        match best {
            Some((_, best_similarity)) if similarity <= best_similarity => {}
            _ => best = Some((index, similarity)),
        }
    }

    best.map(|(index, _)| index)
        .ok_or(RetrievalError::NoChunksAvailable)
}
