//! Deterministic mock provider.
//!
//! Used in tests and in deployments without real credentials. Echoes a
//! prefix of the prompt, reports fixed usage, and fails on demand when the
//! prompt carries the failure marker.

use super::{ProviderAdapter, ProviderResult, ProviderUsage};
use crate::types::CompletionOptions;
use anyhow::Result;
use async_trait::async_trait;

/// Prompts containing this marker make the mock fail, which is how breaker
/// and fallback behavior is exercised end to end.
pub const FAILURE_MARKER: &str = "FAIL_PROVIDER";

pub struct MockProvider;

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<ProviderResult> {
        if prompt.contains(FAILURE_MARKER) {
            anyhow::bail!("Simulated provider failure");
        }

        let preview: String = prompt.chars().take(100).collect();
        Ok(ProviderResult {
            text: format!("Mock response for: {}", preview),
            model: "mock-model".to_string(),
            finish_reason: "stop".to_string(),
            usage: ProviderUsage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            },
        })
    }
}
