//! In-memory hybrid vector index.
//!
//! Chunks are appended once at ingestion and ranked at query time by a
//! weighted sum of embedding cosine similarity and keyword overlap. The
//! weights are configurable and are not required to sum to 1.

use std::sync::RwLock;
use tracing::{info, warn};

/// One indexed chunk. Created at ingestion, immutable afterwards.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A chunk returned from search, carrying its hybrid score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub score: f32,
}

pub struct VectorIndex {
    alpha: f32,
    beta: f32,
    chunks: RwLock<Vec<DocumentChunk>>,
}

impl VectorIndex {
    /// `alpha` weighs cosine similarity, `beta` weighs keyword overlap.
    pub fn new(alpha: f32, beta: f32) -> Self {
        Self {
            alpha,
            beta,
            chunks: RwLock::new(Vec::new()),
        }
    }

    pub fn add_chunk(
        &self,
        document_id: impl Into<String>,
        chunk_index: usize,
        text: impl Into<String>,
        embedding: Vec<f32>,
    ) {
        let mut chunks = self.write();
        chunks.push(DocumentChunk {
            document_id: document_id.into(),
            chunk_index,
            text: text.into(),
            embedding,
        });
        info!(total_chunks = chunks.len(), "chunk indexed");
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Removes every chunk. The only way records leave the index.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Top-k chunks by descending hybrid score. An empty index returns an
    /// empty list.
    pub fn search(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        top_k: usize,
    ) -> Vec<ScoredChunk> {
        let chunks = self.read();
        if chunks.is_empty() {
            warn!("vector index is empty");
            return Vec::new();
        }

        let mut results: Vec<ScoredChunk> = chunks
            .iter()
            .map(|chunk| {
                let vector_score = cosine_similarity(query_embedding, &chunk.embedding);
                let keyword_score = keyword_overlap(query_text, &chunk.text);
                ScoredChunk {
                    document_id: chunk.document_id.clone(),
                    chunk_index: chunk.chunk_index,
                    text: chunk.text.clone(),
                    score: self.alpha * vector_score + self.beta * keyword_score,
                }
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        results
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<DocumentChunk>> {
        self.chunks.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<DocumentChunk>> {
        self.chunks.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// dot(a, b) / (|a| * |b|); 0 for empty or zero-norm vectors. Mismatched
/// dimensions compare over the shorter length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let length = a.len().min(b.len());
    if length == 0 {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..length {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Fraction of the query's lower-cased whitespace tokens occurring as a
/// substring of the lower-cased text. 0 for an empty query.
pub fn keyword_overlap(query: &str, text: &str) -> f32 {
    let query_lower = query.to_lowercase();
    let words: Vec<&str> = query_lower.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }

    let text_lower = text.to_lowercase();
    let matches = words.iter().filter(|w| text_lower.contains(**w)).count();
    matches as f32 / words.len() as f32
}
