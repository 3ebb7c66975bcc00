//! Gateway core: provider registry, dispatch with timeout and retry, and
//! the request orchestrator that ties validation, retrieval, caching, and
//! breakers together.

pub mod orchestrator;
pub mod registry;
pub mod retry;

pub use orchestrator::Gateway;
pub use registry::ProviderRegistry;
pub use retry::{call_with_timeout_and_retry, is_retryable, MAX_ATTEMPTS};
