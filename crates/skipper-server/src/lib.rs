//! Skipper Server
//!
//! HTTP API for the AI tool-execution core: chat streaming, agent runs,
//! approval mutations and conversation access. This is a library crate —
//! the server is started via `start_server()`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{http::Method, middleware, routing::get, Json, Router};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use skipper_core::config::Config;
use skipper_core::llm::{HttpModelProvider, ModelProvider};
use skipper_core::services::Services;
use skipper_core::storage::{Database, ExecutionSignals};
use skipper_core::tools::{build_registry, ToolRegistry};

pub mod auth;
pub mod error;
pub mod routes;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db_path: Arc<PathBuf>,
    pub config: Arc<Config>,
    pub services: Arc<Services>,
    pub registry: Arc<ToolRegistry>,
    pub signals: Arc<ExecutionSignals>,
    pub models: Arc<dyn ModelProvider>,
}

/// Build the Axum router with all routes.
pub fn build_router(config: Config) -> anyhow::Result<(Router, AppState)> {
    let config = Arc::new(config);
    let db_path = Arc::new(config.db_path.clone());
    // Fail fast when the database cannot be opened or migrated.
    let _db = Database::new(&db_path)?;

    let state = AppState {
        db_path,
        services: Arc::new(Services::from_config(config.clone())),
        registry: Arc::new(build_registry()?),
        signals: Arc::new(ExecutionSignals::new()),
        models: Arc::new(HttpModelProvider),
        config,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .nest(
            "/api",
            routes::api_router().layer(middleware::from_fn_with_state(
                state.clone(),
                auth::auth_middleware,
            )),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    Ok((app, state))
}

/// Start the Skipper server and block until shutdown.
pub async fn start_server(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let (app, _state) = build_router(config)?;

    tracing::info!("Skipper server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        features: HashMap::from([("chat".to_string(), true), ("agent".to_string(), true)]),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    features: HashMap<String, bool>,
}
