//! HTTP API gateway for AgroCert.
//!
//! Exposes the chat endpoints (blocking and SSE streaming), session CRUD,
//! and a health check. Built on Axum; all dependencies are constructed once
//! at startup and shared via the state — no global clients anywhere.

pub mod api;

use agrocert_agent::{ChatService, ChatSettings};
use agrocert_core::memory::NoopMemory;
use axum::{response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared state for the gateway.
pub struct GatewayState {
    pub service: Arc<ChatService>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router: API routes under `/api` plus `/health`.
pub fn build_router(state: SharedState, allowed_origins: &[String]) -> Router {
    let cors = build_cors(allowed_origins);

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api::api_router(state))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn build_cors(allowed_origins: &[String]) -> CorsLayer {
    let mut cors = CorsLayer::new()
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let origins: Vec<axum::http::HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    if !origins.is_empty() {
        cors = cors.allow_origin(tower_http::cors::AllowOrigin::list(origins));
    }
    cors
}

/// Start the gateway HTTP server.
///
/// Builds provider, store, tool registry, and the chat service exactly once
/// and shares them across all requests.
pub async fn start(config: agrocert_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let database_url = config
        .database
        .url
        .clone()
        .ok_or("DATABASE_URL is not configured")?;
    let api_key = config
        .api_key
        .clone()
        .ok_or("ANTHROPIC_API_KEY is not configured")?;

    let store = Arc::new(
        agrocert_store::PgStore::connect(
            &database_url,
            config.database.min_connections,
            config.database.max_connections,
            config.database.acquire_timeout_secs,
        )
        .await?,
    );

    let provider = Arc::new(agrocert_providers::AnthropicProvider::new(api_key));
    let registry = Arc::new(agrocert_tools::certification_registry(store.clone())?);
    info!(tools = registry.len(), "Tool registry initialized");

    let service = Arc::new(ChatService::new(
        store,
        provider,
        registry,
        Arc::new(NoopMemory),
        ChatSettings {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_iterations: config.agent.max_iterations,
            history_limit: config.agent.history_limit,
            history_budget: config.history.max_context_tokens,
            keep_most_recent: config.history.keep_most_recent,
            summary_threshold: config.history.summary_threshold,
        },
    ));

    let state = Arc::new(GatewayState { service });
    let app = build_router(state, &config.gateway.allowed_origins);

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
