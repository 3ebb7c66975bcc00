//! relay - an LLM gateway
//!
//! Commands:
//!   serve - Start the HTTP gateway

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relay::cache::{CacheStore, MemoryCache, RedisCache};
use relay::config::GatewayConfig;
use relay::embedding::embedder_from_config;
use relay::gateway::{Gateway, ProviderRegistry};
use relay::metrics::Metrics;
use relay::rag::RagService;
use relay::ratelimit::{MemoryCounter, RateLimiter, RedisCounter};
use relay::server::{build_router, AppState};
use relay::vector::VectorIndex;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "LLM gateway with caching, retrieval, and circuit breaking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relay=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => {
            let mut config = GatewayConfig::from_env();
            if let Some(port) = port {
                config.server.port = port;
            }
            run_server(config).await
        }
    }
}

async fn run_server(config: GatewayConfig) -> Result<()> {
    let config = Arc::new(config);

    // Shared stores. Redis when configured, in-process fallbacks otherwise;
    // the fallbacks do not coordinate across instances.
    let (cache, limiter): (Arc<CacheStore>, Arc<RateLimiter>) = if !config.redis_url.is_empty() {
        let client =
            redis::Client::open(config.redis_url.as_str()).context("invalid REDIS_URL")?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .context("failed to connect to redis")?;
        info!("connected to redis");
        (
            Arc::new(CacheStore::new(
                Some(Arc::new(RedisCache::new(conn.clone()))),
                &config.cache,
            )),
            Arc::new(RateLimiter::new(
                Arc::new(RedisCounter::new(conn)),
                Arc::clone(&config),
            )),
        )
    } else {
        warn!("REDIS_URL not set, using in-process cache and rate limit counters");
        (
            Arc::new(CacheStore::new(
                Some(Arc::new(MemoryCache::new())),
                &config.cache,
            )),
            Arc::new(RateLimiter::new(
                Arc::new(MemoryCounter::new()),
                Arc::clone(&config),
            )),
        )
    };

    let registry = Arc::new(ProviderRegistry::from_config(&config));
    let index = Arc::new(VectorIndex::new(
        config.rag.hybrid_alpha,
        config.rag.hybrid_beta,
    ));
    let embedder = embedder_from_config(&config);
    let rag = Arc::new(RagService::new(index, embedder, &config.rag));

    let gateway = Arc::new(Gateway::new(
        Arc::clone(&config),
        registry,
        Arc::clone(&cache),
        Arc::clone(&rag),
    ));

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        gateway,
        rate_limiter: limiter,
        rag,
        cache,
        metrics: Arc::new(Metrics::new()),
    });
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, environment = %config.server.environment, "relay listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;
    Ok(())
}
