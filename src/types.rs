//! Universal types for gateway requests and responses.
//!
//! These types isolate the orchestration logic from specific provider APIs
//! and from the HTTP transport.

use crate::breaker::CircuitState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Generation options accepted on every completion request.
///
/// Field order is fixed by this definition; cache keys are derived from a
/// sorted-key JSON rendering so wire-level key order never matters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Enrich the prompt with retrieved context before dispatch.
    #[serde(default)]
    pub use_rag: bool,
    /// Skip the response cache for this request.
    #[serde(default)]
    pub no_cache: bool,
}

/// The caller on whose behalf a request runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Principal {
    /// Authenticated user id, when known.
    pub id: Option<String>,
    /// Role claim; quota lookups fall back to "user" when absent.
    pub role: Option<String>,
    /// Set when the caller authenticated with the shared gateway credential.
    #[serde(default)]
    pub gateway: bool,
    /// Caller IP, the identity of last resort for rate limiting.
    pub ip: Option<String>,
}

impl Principal {
    /// Effective role for quota lookups.
    pub fn role(&self) -> &str {
        self.role.as_deref().unwrap_or("user")
    }

    /// Rate-limit identity: user id, else gateway credential, else IP.
    pub fn rate_identity(&self) -> String {
        if let Some(id) = &self.id {
            format!("user:{}", id)
        } else if self.gateway {
            "gateway".to_string()
        } else {
            format!("ip:{}", self.ip.as_deref().unwrap_or("unknown"))
        }
    }
}

/// A completion request as the orchestrator consumes it. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    /// Provider name; the registry default is used when absent.
    pub provider: Option<String>,
    pub options: CompletionOptions,
    pub request_id: String,
    pub principal: Principal,
}

/// Token usage and estimated cost for one completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    /// (total_tokens / 1000) x per-model rate, rounded to 6 decimals.
    pub estimated_cost: f64,
}

/// Whether the response cache participated in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheStatus {
    /// Served from the cache, no provider call made.
    Hit,
    /// Looked up, not found, provider called, result stored.
    Miss,
    /// Caller opted out via `noCache`.
    Bypass,
    /// Caching disabled or the shared store is unavailable.
    Disabled,
}

/// Per-request bookkeeping attached to every response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub role: String,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    /// Breaker state for the serving provider, read at completion time.
    pub circuit_state: CircuitState,
    pub rag_used: bool,
    pub cache_status: CacheStatus,
}

/// The normalized completion response returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    pub request_id: String,
    pub provider: String,
    pub model: String,
    pub text: String,
    pub finish_reason: String,
    pub usage: Usage,
    pub metadata: ResponseMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_role() {
        let principal = Principal::default();
        assert_eq!(principal.role(), "user");
    }

    #[test]
    fn test_rate_identity_precedence() {
        let user = Principal {
            id: Some("u1".to_string()),
            gateway: true,
            ip: Some("10.0.0.1".to_string()),
            ..Default::default()
        };
        assert_eq!(user.rate_identity(), "user:u1");

        let gateway = Principal {
            gateway: true,
            ip: Some("10.0.0.1".to_string()),
            ..Default::default()
        };
        assert_eq!(gateway.rate_identity(), "gateway");

        let anonymous = Principal {
            ip: Some("10.0.0.1".to_string()),
            ..Default::default()
        };
        assert_eq!(anonymous.rate_identity(), "ip:10.0.0.1");

        assert_eq!(Principal::default().rate_identity(), "ip:unknown");
    }

    #[test]
    fn test_options_accept_camel_case() {
        let options: CompletionOptions =
            serde_json::from_str(r#"{"maxTokens":256,"useRag":true}"#).unwrap();
        assert_eq!(options.max_tokens, Some(256));
        assert!(options.use_rag);
        assert!(!options.no_cache);
    }
}
