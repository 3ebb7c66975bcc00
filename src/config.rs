//! Configuration for the gateway.
//!
//! Everything is read from environment variables with production-safe
//! defaults, so a bare `relay serve` comes up against the mock provider and
//! an in-process store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Flags like CACHE_ENABLED default to on and are only disabled by an
/// explicit "false".
fn env_flag_on(key: &str) -> bool {
    std::env::var(key).map(|v| v != "false").unwrap_or(true)
}

fn env_flag_off(key: &str) -> bool {
    std::env::var(key).map(|v| v == "true").unwrap_or(false)
}

/// Server listen settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub environment: String,
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
}

/// Retrieval-augmentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub enabled: bool,
    pub top_k: usize,
    /// Chunk window size in words.
    pub chunk_size: usize,
    /// Overlap between consecutive windows, in words.
    pub chunk_overlap: usize,
    /// Weight of embedding cosine similarity in the hybrid score.
    pub hybrid_alpha: f32,
    /// Weight of keyword overlap in the hybrid score.
    pub hybrid_beta: f32,
    /// When true, an enrichment failure degrades to the unenriched prompt
    /// instead of failing the request.
    pub fail_open: bool,
}

/// Circuit breaker settings, applied uniformly to every provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_time_ms: u64,
}

/// Fixed-window rate limit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    /// Global fallback when the caller's role has no configured limit.
    pub max_requests: u64,
}

/// Per-role quotas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleLimit {
    pub max_tokens: u32,
    pub max_requests_per_minute: u64,
}

/// Connection settings for one upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub default_model: String,
    pub timeout_ms: u64,
}

impl ProviderConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Full gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub gateway_api_key: String,
    pub redis_url: String,
    /// Deadline raced against each provider attempt, in milliseconds.
    pub global_timeout_ms: u64,
    pub cache: CacheConfig,
    pub rag: RagConfig,
    pub breaker: BreakerConfig,
    pub rate_limit: RateLimitConfig,
    pub max_prompt_length: usize,
    /// Hard cap on `maxTokens` regardless of role.
    pub max_tokens: u32,
    pub openai: ProviderConfig,
    pub anthropic: ProviderConfig,
    /// OpenAI model used for query/chunk embeddings.
    pub embedding_model: String,
    /// Registers the deterministic mock provider alongside real ones.
    pub mock_provider_enabled: bool,
    pub role_limits: HashMap<String, RoleLimit>,
    /// Cost per 1K tokens, keyed by model name. Unknown models cost 0.
    pub cost_per_1k_tokens: HashMap<String, f64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let mut role_limits = HashMap::new();
        role_limits.insert(
            "user".to_string(),
            RoleLimit {
                max_tokens: 2048,
                max_requests_per_minute: 60,
            },
        );
        role_limits.insert(
            "admin".to_string(),
            RoleLimit {
                max_tokens: 8192,
                max_requests_per_minute: 500,
            },
        );

        let mut cost_per_1k_tokens = HashMap::new();
        cost_per_1k_tokens.insert("gpt-4".to_string(), 0.03);
        cost_per_1k_tokens.insert("gpt-4o".to_string(), 0.005);
        cost_per_1k_tokens.insert("gpt-3.5-turbo".to_string(), 0.002);
        cost_per_1k_tokens.insert("claude-3-5-sonnet-20241022".to_string(), 0.003);
        cost_per_1k_tokens.insert("mock-model".to_string(), 0.0);

        Self {
            server: ServerConfig {
                port: 3000,
                environment: "development".to_string(),
            },
            gateway_api_key: String::new(),
            redis_url: String::new(),
            global_timeout_ms: 35_000,
            cache: CacheConfig {
                enabled: true,
                ttl_seconds: 600,
            },
            rag: RagConfig {
                enabled: true,
                top_k: 3,
                chunk_size: 800,
                chunk_overlap: 150,
                hybrid_alpha: 0.7,
                hybrid_beta: 0.3,
                fail_open: false,
            },
            breaker: BreakerConfig {
                failure_threshold: 5,
                recovery_time_ms: 30_000,
            },
            rate_limit: RateLimitConfig {
                window_ms: 60_000,
                max_requests: 100,
            },
            max_prompt_length: 50_000,
            max_tokens: 4096,
            openai: ProviderConfig {
                api_key: String::new(),
                base_url: "https://api.openai.com/v1".to_string(),
                default_model: "gpt-4".to_string(),
                timeout_ms: 30_000,
            },
            anthropic: ProviderConfig {
                api_key: String::new(),
                base_url: "https://api.anthropic.com/v1".to_string(),
                default_model: "claude-3-5-sonnet-20241022".to_string(),
                timeout_ms: 30_000,
            },
            embedding_model: "text-embedding-3-small".to_string(),
            mock_provider_enabled: false,
            role_limits,
            cost_per_1k_tokens,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            server: ServerConfig {
                port: env_parse("PORT", defaults.server.port),
                environment: env_string("RELAY_ENV", &defaults.server.environment),
            },
            gateway_api_key: env_string("GATEWAY_API_KEY", ""),
            redis_url: env_string("REDIS_URL", ""),
            global_timeout_ms: env_parse("GLOBAL_TIMEOUT", defaults.global_timeout_ms),
            cache: CacheConfig {
                enabled: env_flag_on("CACHE_ENABLED"),
                ttl_seconds: env_parse("CACHE_TTL_SECONDS", defaults.cache.ttl_seconds),
            },
            rag: RagConfig {
                enabled: env_flag_on("RAG_ENABLED"),
                top_k: env_parse("RAG_TOP_K", defaults.rag.top_k),
                chunk_size: env_parse("RAG_CHUNK_SIZE", defaults.rag.chunk_size),
                chunk_overlap: env_parse("RAG_CHUNK_OVERLAP", defaults.rag.chunk_overlap),
                hybrid_alpha: env_parse("RAG_HYBRID_ALPHA", defaults.rag.hybrid_alpha),
                hybrid_beta: env_parse("RAG_HYBRID_BETA", defaults.rag.hybrid_beta),
                fail_open: env_flag_off("RAG_FAIL_OPEN"),
            },
            breaker: BreakerConfig {
                failure_threshold: env_parse(
                    "CIRCUIT_FAILURE_THRESHOLD",
                    defaults.breaker.failure_threshold,
                ),
                recovery_time_ms: env_parse(
                    "CIRCUIT_RESET_TIMEOUT_MS",
                    defaults.breaker.recovery_time_ms,
                ),
            },
            rate_limit: RateLimitConfig {
                window_ms: env_parse("RATE_LIMIT_WINDOW_MS", defaults.rate_limit.window_ms),
                max_requests: env_parse(
                    "RATE_LIMIT_MAX_REQUESTS",
                    defaults.rate_limit.max_requests,
                ),
            },
            max_prompt_length: env_parse("MAX_PROMPT_LENGTH", defaults.max_prompt_length),
            max_tokens: env_parse("MAX_TOKENS", defaults.max_tokens),
            openai: ProviderConfig {
                api_key: env_string("OPENAI_API_KEY", ""),
                base_url: env_string("OPENAI_BASE_URL", &defaults.openai.base_url),
                default_model: env_string("OPENAI_DEFAULT_MODEL", &defaults.openai.default_model),
                timeout_ms: env_parse("OPENAI_TIMEOUT", defaults.openai.timeout_ms),
            },
            anthropic: ProviderConfig {
                api_key: env_string("ANTHROPIC_API_KEY", ""),
                base_url: env_string("ANTHROPIC_BASE_URL", &defaults.anthropic.base_url),
                default_model: env_string(
                    "ANTHROPIC_DEFAULT_MODEL",
                    &defaults.anthropic.default_model,
                ),
                timeout_ms: env_parse("ANTHROPIC_TIMEOUT", defaults.anthropic.timeout_ms),
            },
            embedding_model: env_string("OPENAI_EMBEDDING_MODEL", &defaults.embedding_model),
            mock_provider_enabled: env_flag_off("MOCK_PROVIDER_ENABLED"),
            role_limits: defaults.role_limits,
            cost_per_1k_tokens: defaults.cost_per_1k_tokens,
        }
    }

    /// Quota for a role, falling back to the "user" limits and finally to
    /// the global defaults for roles nobody configured.
    pub fn role_limit(&self, role: &str) -> RoleLimit {
        self.role_limits
            .get(role)
            .or_else(|| self.role_limits.get("user"))
            .cloned()
            .unwrap_or(RoleLimit {
                max_tokens: 2048,
                max_requests_per_minute: self.rate_limit.max_requests,
            })
    }

    /// Per-1K-token rate for a model; 0 for unknown models.
    pub fn cost_for_model(&self, model: &str) -> f64 {
        self.cost_per_1k_tokens.get(model).copied().unwrap_or(0.0)
    }
}
