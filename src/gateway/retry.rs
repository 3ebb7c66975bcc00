//! Timeout-and-retry wrapper around a single provider call.
//!
//! Each attempt races the provider call against the global deadline;
//! `tokio::time::timeout` drops the losing future, so a timed-out call
//! holds no resources. A retry begins only after the prior attempt has
//! fully completed or timed out, and only failures classified retryable
//! get the second (and last) attempt.

use crate::error::GatewayError;
use crate::providers::{ProviderAdapter, ProviderResult};
use crate::types::CompletionOptions;
use std::time::Duration;
use tracing::warn;

/// Total attempts per dispatch, including the first.
pub const MAX_ATTEMPTS: u32 = 2;

/// Transient upstream failures worth one retry: timeouts and the
/// rate-limit/server-error status markers adapters embed in messages.
pub fn is_retryable(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("429")
        || lower.contains("500")
        || lower.contains("503")
}

pub async fn call_with_timeout_and_retry(
    provider: &dyn ProviderAdapter,
    prompt: &str,
    options: &CompletionOptions,
    deadline: Duration,
) -> Result<ProviderResult, GatewayError> {
    let mut message = String::new();

    for attempt in 1..=MAX_ATTEMPTS {
        message = match tokio::time::timeout(deadline, provider.complete(prompt, options)).await {
            Ok(Ok(result)) => return Ok(result),
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("Request timeout after {}ms", deadline.as_millis()),
        };

        let retryable = is_retryable(&message);
        warn!(
            provider = provider.name(),
            attempt,
            retryable,
            error = %message,
            "provider attempt failed"
        );

        if !retryable {
            break;
        }
    }

    Err(GatewayError::Provider {
        provider: provider.name().to_string(),
        message,
    })
}
