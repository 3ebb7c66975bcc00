//! Provider registry.
//!
//! Owns the configured adapters for the lifetime of the process and
//! resolves them by name. Construction order matters: the first registered
//! provider is the default for requests that do not name one.

use crate::config::GatewayConfig;
use crate::providers::{AnthropicProvider, MockProvider, OpenAiProvider, ProviderAdapter};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from configuration: each provider with
    /// credentials, plus the mock when explicitly enabled.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let mut registry = Self::new();

        if config.openai.is_configured() {
            registry.register(Arc::new(OpenAiProvider::new(&config.openai)));
            info!("OpenAI provider initialized");
        }
        if config.anthropic.is_configured() {
            registry.register(Arc::new(AnthropicProvider::new(&config.anthropic)));
            info!("Anthropic provider initialized");
        }
        if config.mock_provider_enabled {
            registry.register(Arc::new(MockProvider));
            info!("Mock provider initialized");
        }

        if registry.is_empty() {
            warn!("no providers initialized, configure API keys to enable providers");
        }

        registry
    }

    pub fn register(&mut self, provider: Arc<dyn ProviderAdapter>) {
        self.providers.push(provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.iter().any(|p| p.name() == name)
    }

    /// Configured provider names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// First configured provider, used when a request names none.
    pub fn default_provider(&self) -> Option<String> {
        self.providers.first().map(|p| p.name().to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }
}
