//! Provider adapters.
//!
//! Every backend implements [`ProviderAdapter`] and is resolved by name
//! from the registry at startup. Adapters normalize responses into
//! [`ProviderResult`]; their error messages stay inspectable (HTTP status
//! markers, timeout wording) for retry classification upstream.

use crate::types::CompletionOptions;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod anthropic;
pub mod mock;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use mock::MockProvider;
pub use openai::OpenAiProvider;

/// Token usage as reported by the backend. Zero means "not reported".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Normalized completion result, common to all backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResult {
    pub text: String,
    pub model: String,
    pub finish_reason: String,
    pub usage: ProviderUsage,
}

/// The capability every generation backend provides.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Registry name for this provider.
    fn name(&self) -> &str;

    /// Whether the provider has the credentials it needs.
    fn is_configured(&self) -> bool;

    /// One completion call. No retry or breaker logic here; the
    /// orchestrator owns resilience.
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<ProviderResult>;
}
