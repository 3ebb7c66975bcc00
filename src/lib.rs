//! relay: an LLM gateway.
//!
//! Requests flow through one pipeline: validation, optional retrieval-based
//! prompt enrichment, a shared response cache, per-provider circuit
//! breakers around dispatch with timeout and retry, and usage/cost
//! accounting. A fixed-window rate limiter in the HTTP layer gates entry.

pub mod breaker;
pub mod cache;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod error;
pub mod gateway;
pub mod guardrails;
pub mod metrics;
pub mod providers;
pub mod rag;
pub mod ratelimit;
pub mod server;
pub mod tokens;
pub mod types;
pub mod vector;

// Re-export key types
pub use breaker::{CircuitBreaker, CircuitState};
pub use error::GatewayError;
pub use gateway::{Gateway, ProviderRegistry};
pub use types::{CompletionOptions, CompletionRequest, CompletionResponse, Principal};
