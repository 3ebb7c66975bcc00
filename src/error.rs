//! Gateway error taxonomy.
//!
//! Validation failures are returned verbatim to the caller. Provider
//! failures carry the provider name; retry and fallback exhaustion carry the
//! ordered list of per-attempt reasons. Anything unanticipated surfaces as
//! an opaque internal error.

use serde::Serialize;
use thiserror::Error;

/// One failed provider attempt, recorded in order during fallback or retry.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderAttempt {
    pub provider: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed or out-of-policy input. Never retried.
    #[error("{message}")]
    Validation {
        message: String,
        /// Populated when an unknown provider was named.
        available_providers: Option<Vec<String>>,
    },

    /// A backend failure from a single provider.
    #[error("provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    /// The breaker is open; no call reached the provider.
    #[error("circuit is open for provider '{provider}'")]
    CircuitOpen { provider: String },

    /// Every attempted provider failed.
    #[error("all providers failed")]
    AllProvidersFailed { attempts: Vec<ProviderAttempt> },

    /// The caller exceeded its request quota for the current window.
    #[error("rate limit exceeded, please try again later")]
    RateLimited,

    /// Unanticipated failure. The display form never leaks internal detail;
    /// the source is preserved for logging.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            available_providers: None,
        }
    }

    /// Error type name exposed in API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "ValidationError",
            Self::Provider { .. } | Self::CircuitOpen { .. } | Self::AllProvidersFailed { .. } => {
                "ProviderError"
            }
            Self::RateLimited => "RateLimitError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// HTTP status the transport layer should map this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Provider { .. } | Self::CircuitOpen { .. } | Self::AllProvidersFailed { .. } => {
                502
            }
            Self::RateLimited => 429,
            Self::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(GatewayError::validation("bad").status_code(), 400);
        assert_eq!(GatewayError::RateLimited.status_code(), 429);
        assert_eq!(
            GatewayError::Provider {
                provider: "openai".to_string(),
                message: "boom".to_string()
            }
            .status_code(),
            502
        );
        assert_eq!(
            GatewayError::Internal(anyhow::anyhow!("secret detail")).status_code(),
            500
        );
    }

    #[test]
    fn test_internal_error_is_opaque() {
        let err = GatewayError::Internal(anyhow::anyhow!("connection string leaked"));
        assert_eq!(err.to_string(), "internal error");
    }

    #[test]
    fn test_circuit_open_names_provider() {
        let err = GatewayError::CircuitOpen {
            provider: "anthropic".to_string(),
        };
        assert!(err.to_string().contains("anthropic"));
        assert_eq!(err.kind(), "ProviderError");
    }
}
