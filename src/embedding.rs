//! Embedding generation for retrieval.
//!
//! The trait isolates the index and RAG pipeline from the embedding
//! backend. The OpenAI client is used when an API key is configured; the
//! deterministic mock substitutes otherwise so search behavior stays
//! reproducible in development and tests.

use crate::config::GatewayConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Dimension of every embedding produced by this module.
pub const EMBEDDING_DIMENSION: usize = 1536;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Fixed-dimension vector for `text`; identical input yields an
    /// identical vector.
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>>;
}

/// OpenAI embeddings API client.
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            model,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: text.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding request failed: HTTP {}: {}", status, body);
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        let first = parsed
            .data
            .into_iter()
            .next()
            .context("No embedding returned")?;
        Ok(first.embedding)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Deterministic mock: each component is derived from a byte of the input,
/// so identical text always embeds identically.
pub struct MockEmbedder;

#[async_trait]
impl Embedder for MockEmbedder {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let bytes = text.as_bytes();
        let vector = (0..EMBEDDING_DIMENSION)
            .map(|i| {
                if bytes.is_empty() {
                    return 0.0;
                }
                let byte = bytes[i % bytes.len()] as u64;
                ((byte * (i as u64 + 1)) % 1000) as f32 / 1000.0
            })
            .collect();
        Ok(vector)
    }
}

/// Pick the embedder for the current configuration.
pub fn embedder_from_config(config: &GatewayConfig) -> Arc<dyn Embedder> {
    if config.openai.is_configured() {
        Arc::new(OpenAiEmbedder::new(
            config.openai.api_key.clone(),
            config.openai.base_url.clone(),
            config.embedding_model.clone(),
        ))
    } else {
        warn!("OpenAI API key not configured, using mock embeddings");
        Arc::new(MockEmbedder)
    }
}
