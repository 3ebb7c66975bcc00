//! Retrieval-augmented generation service.
//!
//! Ingestion: chunk the document into overlapping word windows, embed each
//! window, append to the index. Enrichment: embed the prompt, retrieve the
//! top-K chunks, and wrap the prompt in a context block.

use crate::chunker::chunk_text;
use crate::config::RagConfig;
use crate::embedding::Embedder;
use crate::vector::VectorIndex;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

pub struct RagService {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RagService {
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn Embedder>, config: &RagConfig) -> Self {
        Self {
            index,
            embedder,
            top_k: config.top_k,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Augmented prompt built from retrieved context, or None when the
    /// index has nothing relevant (the caller keeps the original prompt).
    pub async fn enrich_prompt(&self, prompt: &str) -> Result<Option<String>> {
        let query_embedding = self
            .embedder
            .generate_embedding(prompt)
            .await
            .context("Failed to embed query")?;

        let chunks = self.index.search(&query_embedding, prompt, self.top_k);
        if chunks.is_empty() {
            return Ok(None);
        }

        let context_block = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| format!("Context {}:\n{}", i + 1, chunk.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(Some(format!(
            "You must answer strictly using the context below.\n\n{}\n\nUser Question:\n{}",
            context_block, prompt
        )))
    }

    /// Chunk, embed, and index one document. Returns the number of chunks
    /// stored.
    pub async fn ingest_document(&self, document_id: &str, content: &str) -> Result<usize> {
        let chunks = chunk_text(content, self.chunk_size, self.chunk_overlap);

        for (chunk_index, chunk) in chunks.iter().enumerate() {
            let embedding = self
                .embedder
                .generate_embedding(chunk)
                .await
                .with_context(|| format!("Failed to embed chunk {}", chunk_index))?;
            self.index
                .add_chunk(document_id, chunk_index, chunk.clone(), embedding);
        }

        info!(
            document_id,
            chunks_stored = chunks.len(),
            "document ingested"
        );
        Ok(chunks.len())
    }
}
