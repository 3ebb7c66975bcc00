//! HTTP surface.
//!
//! Thin transport over the gateway: extract the caller identity from
//! headers, apply the rate limit, translate JSON bodies into completion
//! requests, and map gateway errors to the wire error envelope.

use crate::cache::CacheStore;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::metrics::Metrics;
use crate::rag::RagService;
use crate::ratelimit::RateLimiter;
use crate::types::{CompletionOptions, CompletionRequest, Principal};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub gateway: Arc<Gateway>,
    pub rate_limiter: Arc<RateLimiter>,
    pub rag: Arc<RagService>,
    pub cache: Arc<CacheStore>,
    pub metrics: Arc<Metrics>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/completion", post(completion))
        .route("/v1/completion/fallback", post(completion_with_fallback))
        .route("/v1/providers", get(list_providers))
        .route("/v1/rag/documents", post(ingest_document))
        .route("/v1/metrics", get(metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Wire error envelope: `{"error": {"message", "type", "details"}}`.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let details = match &self {
            GatewayError::Validation {
                available_providers: Some(providers),
                ..
            } => json!({ "availableProviders": providers }),
            GatewayError::AllProvidersFailed { attempts } => json!({ "attempts": attempts }),
            _ => serde_json::Value::Null,
        };

        let body = json!({
            "error": {
                "message": self.to_string(),
                "type": self.kind(),
                "details": details,
            }
        });

        (status, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionBody {
    prompt: String,
    provider: Option<String>,
    #[serde(default)]
    options: CompletionOptions,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FallbackBody {
    prompt: String,
    /// Explicit fallback order; the registry order is used when absent.
    providers: Option<Vec<String>>,
    #[serde(default)]
    options: CompletionOptions,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestBody {
    document_id: Option<String>,
    content: String,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.metrics.record_request();
    Json(json!({
        "status": "healthy",
        "environment": state.config.server.environment,
        "providers": state.gateway.available_providers(),
        "timestamp": chrono::Utc::now(),
    }))
}

async fn list_providers(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, GatewayError> {
    state.metrics.record_request();
    let principal = extract_principal(&headers, addr, &state.config);
    state.rate_limiter.check(&principal).await?;

    Ok(Json(json!({ "providers": state.gateway.available_providers() })))
}

/// System metrics, admin only.
async fn metrics(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, GatewayError> {
    state.metrics.record_request();
    let principal = extract_principal(&headers, addr, &state.config);
    require_admin(&principal)?;
    state.rate_limiter.check(&principal).await?;

    let store_status = if state.cache.healthy().await {
        "healthy"
    } else {
        "unhealthy"
    };

    Ok(Json(json!({
        "uptimeSeconds": state.metrics.uptime_seconds(),
        "environment": state.config.server.environment,
        "totalRequests": state.metrics.total_requests(),
        "storeStatus": store_status,
        "providers": state.gateway.available_providers(),
    })))
}

async fn completion(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<CompletionBody>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    state.metrics.record_request();
    let principal = extract_principal(&headers, addr, &state.config);
    state.rate_limiter.check(&principal).await?;

    let request = CompletionRequest {
        prompt: body.prompt,
        provider: body.provider,
        options: body.options,
        request_id: new_request_id(),
        principal,
    };

    let response = state.gateway.complete(&request).await?;
    Ok(Json(json!({ "success": true, "data": response })))
}

/// Fallback dispatch is restricted: only admins and the gateway credential
/// may burn through the whole provider list.
async fn completion_with_fallback(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<FallbackBody>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    state.metrics.record_request();
    let principal = extract_principal(&headers, addr, &state.config);
    require_admin(&principal)?;
    state.rate_limiter.check(&principal).await?;

    let request = CompletionRequest {
        prompt: body.prompt,
        provider: None,
        options: body.options,
        request_id: new_request_id(),
        principal,
    };

    let response = state
        .gateway
        .complete_with_fallback(&request, body.providers)
        .await?;
    Ok(Json(json!({ "success": true, "data": response })))
}

async fn ingest_document(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<IngestBody>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    state.metrics.record_request();
    let principal = extract_principal(&headers, addr, &state.config);
    require_admin(&principal)?;
    state.rate_limiter.check(&principal).await?;

    if body.content.trim().is_empty() {
        return Err(GatewayError::validation("Document content must be non-empty"));
    }

    let document_id = body
        .document_id
        .unwrap_or_else(|| format!("doc_{}", Uuid::new_v4().simple()));
    let chunks_stored = state
        .rag
        .ingest_document(&document_id, &body.content)
        .await
        .map_err(GatewayError::Internal)?;

    Ok(Json(json!({
        "success": true,
        "data": { "documentId": document_id, "chunksStored": chunks_stored }
    })))
}

/// Caller identity from headers: the shared gateway credential via
/// `Authorization: Bearer`, user id and role claims via `x-user-id` /
/// `x-user-role`, and the socket address as the identity of last resort.
fn extract_principal(headers: &HeaderMap, addr: SocketAddr, config: &GatewayConfig) -> Principal {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let gateway =
        !config.gateway_api_key.is_empty() && bearer == Some(config.gateway_api_key.as_str());

    let header_string = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    Principal {
        id: header_string("x-user-id"),
        role: header_string("x-user-role"),
        gateway,
        ip: Some(addr.ip().to_string()),
    }
}

fn require_admin(principal: &Principal) -> Result<(), GatewayError> {
    if principal.gateway || principal.role() == "admin" {
        Ok(())
    } else {
        Err(GatewayError::validation(
            "This operation requires the admin role",
        ))
    }
}

fn new_request_id() -> String {
    format!("req_{}", Uuid::new_v4().simple())
}
